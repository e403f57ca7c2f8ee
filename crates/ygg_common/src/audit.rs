//! Append-only audit trail entries for knowledge nodes.
//!
//! Every state, confidence, or queue change appends exactly one entry.
//! Entries are never mutated or deleted; the store orders them by append
//! sequence so the trail is a total history of the node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::NodeState;

/// What kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Node created.
    Create,
    /// State and/or confidence transition.
    Transition,
    /// Priority queue reassignment.
    QueueChange,
    /// Re-transition applied by a checkpoint rollback.
    Rollback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Transition => "TRANSITION",
            AuditAction::QueueChange => "QUEUE_CHANGE",
            AuditAction::Rollback => "ROLLBACK",
        }
    }

}

/// One immutable entry in a node's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_state: Option<NodeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_state: Option<NodeState>,
    /// What caused the change ("pipeline", "watcher", "cascade:<root>", ...).
    pub trigger: String,
    /// Acting component or council member.
    pub agent: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_delta: Option<i16>,
    /// Council vote record attached to transitions driven by a deliberation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_record: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, trigger: &str, agent: &str, reason: &str) -> Self {
        Self {
            ts: Utc::now(),
            action,
            from_state: None,
            to_state: None,
            trigger: trigger.to_string(),
            agent: agent.to_string(),
            reason: reason.to_string(),
            confidence_delta: None,
            vote_record: None,
        }
    }

    pub fn with_states(mut self, from: Option<NodeState>, to: NodeState) -> Self {
        self.from_state = from;
        self.to_state = Some(to);
        self
    }

    pub fn with_confidence_delta(mut self, delta: i16) -> Self {
        self.confidence_delta = Some(delta);
        self
    }

    pub fn with_vote_record(mut self, record: serde_json::Value) -> Self {
        self.vote_record = Some(record);
        self
    }
}
