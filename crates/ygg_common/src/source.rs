//! Literal sources cited by verified answers.
//!
//! Identity is `(source_type, identifier)`; the store enforces uniqueness.
//! Trust is an integer 0-100. Only the validated-provider types may carry
//! trust 100, which is what makes them admissible as MIMIR evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum trust score for a source to anchor a VERIFIED transition.
pub const ANCHOR_TRUST_THRESHOLD: u8 = 80;

/// Provider class of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Arxiv,
    Pubmed,
    Doi,
    Wikipedia,
    Web,
    Internal,
}

impl SourceType {
    /// Providers whose entries may carry trust 100 and feed the MIMIR branch.
    pub fn is_validated_provider(&self) -> bool {
        matches!(self, SourceType::Arxiv | SourceType::Pubmed | SourceType::Doi)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Arxiv => "ARXIV",
            SourceType::Pubmed => "PUBMED",
            SourceType::Doi => "DOI",
            SourceType::Wikipedia => "WIKIPEDIA",
            SourceType::Web => "WEB",
            SourceType::Internal => "INTERNAL",
        }
    }

    pub fn parse(s: &str) -> Option<SourceType> {
        match s {
            "ARXIV" => Some(SourceType::Arxiv),
            "PUBMED" => Some(SourceType::Pubmed),
            "DOI" => Some(SourceType::Doi),
            "WIKIPEDIA" => Some(SourceType::Wikipedia),
            "WEB" => Some(SourceType::Web),
            "INTERNAL" => Some(SourceType::Internal),
            _ => None,
        }
    }
}

/// A citable source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Provider-scoped identifier (arXiv id, PMID, DOI, or URL hash for web).
    pub identifier: String,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Trust score 0-100.
    pub trust_score: u8,
    pub retrieved_at: DateTime<Utc>,
}

impl Source {
    pub fn new(source_type: SourceType, identifier: &str, url: &str, title: &str, trust_score: u8) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_type,
            identifier: identifier.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            authors: Vec::new(),
            trust_score: trust_score.min(100),
            retrieved_at: Utc::now(),
        }
    }

    /// Whether this source can anchor a VERIFIED transition.
    pub fn is_anchor(&self) -> bool {
        self.trust_score >= ANCHOR_TRUST_THRESHOLD
    }

    /// Whether this source is admissible as MIMIR evidence.
    pub fn is_mimir_grade(&self) -> bool {
        self.trust_score == 100 && self.source_type.is_validated_provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_threshold() {
        let mut s = Source::new(SourceType::Arxiv, "2101.00001", "https://arxiv.org/abs/2101.00001", "t", 80);
        assert!(s.is_anchor());
        s.trust_score = 79;
        assert!(!s.is_anchor());
    }

    #[test]
    fn mimir_grade_requires_validated_provider() {
        let web = Source::new(SourceType::Web, "abc", "https://example.com", "t", 100);
        assert!(!web.is_mimir_grade());
        let arxiv = Source::new(SourceType::Arxiv, "2101.00001", "https://arxiv.org/abs/2101.00001", "t", 100);
        assert!(arxiv.is_mimir_grade());
    }
}
