//! Request and response contracts for the query API.
//!
//! A query becomes either a verified answer with literal source citations
//! or an explicit refusal. Nothing in between is ever emitted: response
//! confidence is 100 for verified answers and 0 for refusals.

use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::source::Source;
use crate::trace::{ThinkingStep, ValidationTrace};

/// Per-request options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Require at least one anchored source (trust >= 80). Default true.
    #[serde(default = "default_true")]
    pub require_mimir_anchor: bool,
    /// Deadline for the whole pipeline in milliseconds.
    #[serde(default = "default_max_time_ms")]
    pub max_time_ms: u64,
    #[serde(default)]
    pub return_trace: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_time_ms() -> u64 {
    120_000
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            require_mimir_anchor: true,
            max_time_ms: default_max_time_ms(),
            return_trace: false,
        }
    }
}

/// An incoming query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YggdrasilRequest {
    pub query: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub include_trace: bool,
    #[serde(default)]
    pub options: QueryOptions,
}

/// Why a query was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalReason {
    NoSource,
    NoConsensus,
    BranchViolation,
    Timeout,
    Internal,
}

impl RefusalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalReason::NoSource => "NO_SOURCE",
            RefusalReason::NoConsensus => "NO_CONSENSUS",
            RefusalReason::BranchViolation => "BRANCH_VIOLATION",
            RefusalReason::Timeout => "TIMEOUT",
            RefusalReason::Internal => "INTERNAL",
        }
    }
}

/// The response contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YggdrasilResponse {
    pub is_verified: bool,
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<RefusalReason>,
    pub sources: Vec<Source>,
    pub branch: Option<Branch>,
    /// 100 for verified answers, 0 for refusals. No other value exists.
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<ValidationTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliberation_id: Option<String>,
}

impl YggdrasilResponse {
    pub fn refusal(reason: RefusalReason, trace: Option<ValidationTrace>) -> Self {
        Self {
            is_verified: false,
            answer: None,
            refusal_reason: Some(reason),
            sources: Vec::new(),
            branch: None,
            confidence: 0,
            trace,
            deliberation_id: None,
        }
    }

    pub fn verified(
        answer: String,
        sources: Vec<Source>,
        branch: Branch,
        trace: Option<ValidationTrace>,
    ) -> Self {
        Self {
            is_verified: true,
            answer: Some(answer),
            refusal_reason: None,
            sources,
            branch: Some(branch),
            confidence: 100,
            trace,
            deliberation_id: None,
        }
    }
}

/// Streaming event emitted by the SSE endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Thinking(ThinkingStep),
    Response(Box<YggdrasilResponse>),
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name for this variant. The client terminates on
    /// `response` or `error`.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Thinking(_) => "thinking",
            StreamEvent::Response(_) => "response",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Component health states reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentHealth {
    Ok,
    Degraded,
    Down,
}

/// Health report across the named components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: ComponentHealth,
    pub components: HealthComponents,
}

/// The seven component slots of the health contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthComponents {
    /// Classifier / routing.
    pub ratatosk: ComponentHealth,
    pub mimir: ComponentHealth,
    pub volva: ComponentHealth,
    pub hugin: ComponentHealth,
    /// Council assembly.
    pub thing: ComponentHealth,
    pub odin: ComponentHealth,
    /// Ledger memory.
    pub munin: ComponentHealth,
}

impl HealthComponents {
    pub fn overall(&self) -> ComponentHealth {
        let all = [
            self.ratatosk,
            self.mimir,
            self.volva,
            self.hugin,
            self.thing,
            self.odin,
            self.munin,
        ];
        if all.iter().any(|c| *c == ComponentHealth::Down) {
            ComponentHealth::Down
        } else if all.iter().any(|c| *c == ComponentHealth::Degraded) {
            ComponentHealth::Degraded
        } else {
            ComponentHealth::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_has_zero_confidence_and_no_answer() {
        let r = YggdrasilResponse::refusal(RefusalReason::NoSource, None);
        assert!(!r.is_verified);
        assert_eq!(r.confidence, 0);
        assert!(r.answer.is_none());
        assert_eq!(r.refusal_reason, Some(RefusalReason::NoSource));
    }

    #[test]
    fn refusal_reason_wire_format() {
        let json = serde_json::to_string(&RefusalReason::NoConsensus).unwrap();
        assert_eq!(json, "\"NO_CONSENSUS\"");
    }

    #[test]
    fn options_default_from_empty_json() {
        let opts: QueryOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.require_mimir_anchor);
        assert_eq!(opts.max_time_ms, 120_000);
        assert!(!opts.return_trace);
    }

    #[test]
    fn health_rollup() {
        let mut c = HealthComponents {
            ratatosk: ComponentHealth::Ok,
            mimir: ComponentHealth::Ok,
            volva: ComponentHealth::Ok,
            hugin: ComponentHealth::Ok,
            thing: ComponentHealth::Ok,
            odin: ComponentHealth::Ok,
            munin: ComponentHealth::Ok,
        };
        assert_eq!(c.overall(), ComponentHealth::Ok);
        c.hugin = ComponentHealth::Degraded;
        assert_eq!(c.overall(), ComponentHealth::Degraded);
        c.munin = ComponentHealth::Down;
        assert_eq!(c.overall(), ComponentHealth::Down);
    }
}
