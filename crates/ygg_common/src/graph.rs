//! Dependency edges, cascade results, and checkpoint records.
//!
//! The knowledge graph is pointer-free: adjacency lives in an edge table
//! keyed by `(source, target)`, and traversal is BFS with a visited set so
//! cycles terminate. Edges run source -> target; invalidating a source
//! invalidates its dependents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::node::{NodeState, PriorityQueue};

/// Edge strength at or above which a cascade deprecates the dependent
/// outright instead of scheduling it for review.
pub const CASCADE_STRENGTH_THRESHOLD: f64 = 0.8;

/// Semantic relation carried by a dependency edge. Relations inform future
/// weight tuning; they do not alter cascade topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyRelation {
    DerivedFrom,
    Assumes,
    Supports,
    Contradicts,
}

impl DependencyRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyRelation::DerivedFrom => "DERIVED_FROM",
            DependencyRelation::Assumes => "ASSUMES",
            DependencyRelation::Supports => "SUPPORTS",
            DependencyRelation::Contradicts => "CONTRADICTS",
        }
    }

    pub fn parse(s: &str) -> Option<DependencyRelation> {
        match s {
            "DERIVED_FROM" => Some(DependencyRelation::DerivedFrom),
            "ASSUMES" => Some(DependencyRelation::Assumes),
            "SUPPORTS" => Some(DependencyRelation::Supports),
            "CONTRADICTS" => Some(DependencyRelation::Contradicts),
            _ => None,
        }
    }
}

/// A directed dependency edge, unique per `(source, target)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation: DependencyRelation,
    /// Strength in `[0, 1]`.
    pub strength: f64,
}

/// Outcome of one cascade invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeResult {
    pub root_id: String,
    /// Nodes transitioned to DEPRECATED, in visit order.
    pub invalidated: Vec<String>,
    /// Nodes moved to the HOT queue for review.
    pub review_scheduled: Vec<String>,
    pub duration_ms: u64,
}

impl CascadeResult {
    pub fn invalidated_count(&self) -> usize {
        self.invalidated.len()
    }

    pub fn review_count(&self) -> usize {
        self.review_scheduled.len()
    }
}

/// Per-node snapshot captured by a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub node_id: String,
    pub state: NodeState,
    pub branch: Branch,
    pub confidence: u8,
    pub velocity: f64,
    pub priority_queue: PriorityQueue,
    pub audit_trail_length: u64,
}

/// A labeled, restorable snapshot of selected nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub user_id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stable hash over the sorted member node-id set.
    pub state_hash: String,
    pub member_node_ids: Vec<String>,
    pub snapshots: Vec<NodeSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a checkpoint rollback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    /// Nodes created after the checkpoint that were deprecated.
    pub invalidated_count: usize,
    /// Member nodes restored to their snapshotted state.
    pub restored_count: usize,
}
