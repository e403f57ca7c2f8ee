//! Knowledge nodes: the central entity of the ledger.
//!
//! A node carries a normalized statement, its epistemic branch and
//! confidence (always partition-consistent, see [`crate::branch`]), a state
//! machine, watcher scheduling fields, and velocity bookkeeping. The audit
//! trail and Shapley attribution live in their own store tables and are
//! joined in when a full node is read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::branch::Branch;
use crate::error::{YggError, YggResult};

/// Maximum statement length in bytes after trimming.
pub const MAX_STATEMENT_BYTES: usize = 4096;

/// Velocity magnitude (confidence points per ms) above which a node is HOT.
pub const HOT_VELOCITY_THRESHOLD: f64 = 0.05;
/// Velocity magnitude below which the trend is STABLE.
pub const STABLE_VELOCITY_THRESHOLD: f64 = 0.02;
/// Consecutive unchanged scans before the watcher demotes a node's queue.
pub const IDLE_CYCLES_BEFORE_DEMOTION: u32 = 3;

/// Lifecycle state of a knowledge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    PendingProof,
    Watching,
    Verified,
    Rejected,
    Deprecated,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::PendingProof => "PENDING_PROOF",
            NodeState::Watching => "WATCHING",
            NodeState::Verified => "VERIFIED",
            NodeState::Rejected => "REJECTED",
            NodeState::Deprecated => "DEPRECATED",
        }
    }

    pub fn parse(s: &str) -> Option<NodeState> {
        match s {
            "PENDING_PROOF" => Some(NodeState::PendingProof),
            "WATCHING" => Some(NodeState::Watching),
            "VERIFIED" => Some(NodeState::Verified),
            "REJECTED" => Some(NodeState::Rejected),
            "DEPRECATED" => Some(NodeState::Deprecated),
            _ => None,
        }
    }

    /// Terminal states are retained forever for audit and never rescanned.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Rejected | NodeState::Deprecated)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Watcher scan queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityQueue {
    Hot,
    Warm,
    Cold,
}

impl PriorityQueue {
    /// Rescan interval for this queue: HOT 1 h, WARM 24 h, COLD 7 d.
    pub fn interval(&self) -> Duration {
        match self {
            PriorityQueue::Hot => Duration::hours(1),
            PriorityQueue::Warm => Duration::hours(24),
            PriorityQueue::Cold => Duration::days(7),
        }
    }

    /// One step down the demotion ladder. COLD stays COLD.
    pub fn demoted(&self) -> PriorityQueue {
        match self {
            PriorityQueue::Hot => PriorityQueue::Warm,
            PriorityQueue::Warm | PriorityQueue::Cold => PriorityQueue::Cold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityQueue::Hot => "HOT",
            PriorityQueue::Warm => "WARM",
            PriorityQueue::Cold => "COLD",
        }
    }

    pub fn parse(s: &str) -> Option<PriorityQueue> {
        match s {
            "HOT" => Some(PriorityQueue::Hot),
            "WARM" => Some(PriorityQueue::Warm),
            "COLD" => Some(PriorityQueue::Cold),
            _ => None,
        }
    }
}

impl std::fmt::Display for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of recent confidence movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VelocityTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Epistemic velocity: signed confidence points per millisecond since the
/// last transition. `dt_ms` of zero is treated as one to keep the value
/// finite for same-instant writes.
pub fn compute_velocity(prev_confidence: u8, new_confidence: u8, dt_ms: i64) -> f64 {
    let delta = new_confidence as f64 - prev_confidence as f64;
    delta / dt_ms.max(1) as f64
}

/// Trend classification: `|v| > 0.02` moves by sign, else STABLE.
pub fn trend_for_velocity(velocity: f64) -> VelocityTrend {
    if velocity.abs() > STABLE_VELOCITY_THRESHOLD {
        if velocity > 0.0 {
            VelocityTrend::Increasing
        } else {
            VelocityTrend::Decreasing
        }
    } else {
        VelocityTrend::Stable
    }
}

/// Queue derivation: `|v| > 0.05` is HOT, STABLE trend is COLD, else WARM.
pub fn queue_for_velocity(velocity: f64) -> PriorityQueue {
    if velocity.abs() > HOT_VELOCITY_THRESHOLD {
        PriorityQueue::Hot
    } else if trend_for_velocity(velocity) == VelocityTrend::Stable {
        PriorityQueue::Cold
    } else {
        PriorityQueue::Warm
    }
}

/// A knowledge node as read from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeNode {
    pub id: String,
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub branch: Branch,
    pub state: NodeState,
    pub confidence: u8,
    pub velocity: f64,
    pub priority_queue: PriorityQueue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scan: Option<DateTime<Utc>>,
    pub idle_cycles: u32,
    /// Cumulative per-member contribution percentages.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub shapley_attribution: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a statement: trim whitespace, collapse inner runs, enforce the
/// 4 KiB cap. Empty statements are rejected.
pub fn normalize_statement(raw: &str) -> YggResult<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(YggError::InvalidInput("statement is empty".to_string()));
    }
    if collapsed.len() > MAX_STATEMENT_BYTES {
        return Err(YggError::InvalidInput(format!(
            "statement exceeds {} bytes",
            MAX_STATEMENT_BYTES
        )));
    }
    Ok(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_is_points_per_millisecond() {
        // 80 -> 50 over one hour: |v| ~ 8.3e-6, nowhere near HOT.
        let v = compute_velocity(80, 50, 3_600_000);
        assert!((v + 30.0 / 3_600_000.0).abs() < 1e-12);
        assert_eq!(queue_for_velocity(v), PriorityQueue::Cold);

        // 80 -> 20 in one second: |v| = 0.06, HOT.
        let v = compute_velocity(80, 20, 1_000);
        assert!((v + 0.06).abs() < 1e-12);
        assert_eq!(queue_for_velocity(v), PriorityQueue::Hot);
    }

    #[test]
    fn queue_derivation_is_deterministic() {
        for &(prev, curr, dt) in &[(80u8, 20u8, 1_000i64), (50, 53, 100), (10, 10, 500)] {
            let a = queue_for_velocity(compute_velocity(prev, curr, dt));
            let b = queue_for_velocity(compute_velocity(prev, curr, dt));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn trend_thresholds() {
        assert_eq!(trend_for_velocity(0.019), VelocityTrend::Stable);
        assert_eq!(trend_for_velocity(0.021), VelocityTrend::Increasing);
        assert_eq!(trend_for_velocity(-0.021), VelocityTrend::Decreasing);
        assert_eq!(queue_for_velocity(0.03), PriorityQueue::Warm);
    }

    #[test]
    fn demotion_ladder_ends_cold() {
        assert_eq!(PriorityQueue::Hot.demoted(), PriorityQueue::Warm);
        assert_eq!(PriorityQueue::Warm.demoted(), PriorityQueue::Cold);
        assert_eq!(PriorityQueue::Cold.demoted(), PriorityQueue::Cold);
    }

    #[test]
    fn statement_normalization() {
        assert_eq!(normalize_statement("  a   b\n c ").unwrap(), "a b c");
        assert!(normalize_statement("   ").is_err());
        assert!(normalize_statement(&"x".repeat(5000)).is_err());
    }

    #[test]
    fn zero_dt_stays_finite() {
        let v = compute_velocity(0, 100, 0);
        assert!(v.is_finite());
        assert_eq!(v, 100.0);
    }
}
