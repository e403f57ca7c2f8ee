//! Unverified-search collaborator.
//!
//! The HUGIN branch and the watcher both consume web snippets from an
//! external search service. The service sits behind this narrow trait so
//! the core stays testable; the deployment wires a real provider in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ygg_common::YggResult;

/// One unverified snippet from the open web.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSnippet {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// The search contract. Failures are per-call and recoverable.
#[async_trait]
pub trait UnverifiedSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> YggResult<Vec<WebSnippet>>;
}

/// No-op search used when no provider is wired in. HUGIN simply finds
/// nothing, which downstream reads as an empty evidence set.
pub struct NoopSearch;

#[async_trait]
impl UnverifiedSearch for NoopSearch {
    async fn search(&self, _query: &str, _limit: usize) -> YggResult<Vec<WebSnippet>> {
        Ok(Vec::new())
    }
}

/// Canned-result search for tests.
#[derive(Default)]
pub struct FakeSearch {
    results: Vec<WebSnippet>,
    fail: bool,
}

impl FakeSearch {
    pub fn with_results(results: Vec<WebSnippet>) -> Self {
        Self { results, fail: false }
    }

    pub fn failing() -> Self {
        Self { results: Vec::new(), fail: true }
    }
}

#[async_trait]
impl UnverifiedSearch for FakeSearch {
    async fn search(&self, _query: &str, limit: usize) -> YggResult<Vec<WebSnippet>> {
        if self.fail {
            return Err(ygg_common::YggError::AdapterUnavailable("search backend down".to_string()));
        }
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}
