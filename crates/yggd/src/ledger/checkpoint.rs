//! Checkpoint engine: labeled snapshots and full rollback.
//!
//! A checkpoint captures the scheduling-relevant fields of its member
//! nodes plus a stable hash over the sorted member id set. Rollback never
//! rewrites history: nodes created after the checkpoint (and reachable
//! from its members) are deprecated, and members are re-transitioned to
//! their snapshotted values with ROLLBACK audit entries.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

use tracing::info;

use ygg_common::audit::{AuditAction, AuditEntry};
use ygg_common::graph::{Checkpoint, NodeSnapshot, RollbackReport};
use ygg_common::node::NodeState;
use ygg_common::{YggError, YggResult};

use super::Ledger;

/// Options for checkpoint creation.
#[derive(Debug, Clone, Default)]
pub struct CheckpointOpts {
    pub description: Option<String>,
}

impl Ledger {
    /// Snapshot `member_ids` under `label` for `user_id`.
    pub fn create_checkpoint(
        &self,
        user_id: &str,
        label: &str,
        member_ids: &[String],
        opts: CheckpointOpts,
    ) -> YggResult<Checkpoint> {
        if member_ids.is_empty() {
            return Err(YggError::InvalidInput("checkpoint needs at least one member".to_string()));
        }

        let mut sorted: Vec<String> = member_ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut hasher = Sha256::new();
        let mut snapshots = Vec::with_capacity(sorted.len());
        for id in &sorted {
            let node = self.get_node(id)?;
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
            snapshots.push(NodeSnapshot {
                node_id: id.clone(),
                state: node.state,
                branch: node.branch,
                confidence: node.confidence,
                velocity: node.velocity,
                priority_queue: node.priority_queue,
                audit_trail_length: self.store().audit_trail_len(id)?,
            });
        }

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            label: label.to_string(),
            description: opts.description,
            state_hash: format!("{:x}", hasher.finalize()),
            member_node_ids: sorted,
            snapshots,
            created_at: Utc::now(),
        };
        self.store().insert_checkpoint(&checkpoint)?;
        info!(checkpoint = %checkpoint.id, members = checkpoint.member_node_ids.len(), "checkpoint created");
        Ok(checkpoint)
    }

    /// Roll the ledger back to `checkpoint_id`.
    ///
    /// Nodes created after the checkpoint and reachable from its members
    /// become DEPRECATED; each member is restored to its snapshot. Returns
    /// the counts of both.
    pub fn rollback(&self, checkpoint_id: &str, user_id: &str) -> YggResult<RollbackReport> {
        let checkpoint = self.store().get_checkpoint(checkpoint_id)?;
        let trigger = format!("rollback:{}", checkpoint_id);

        // Nodes reachable from the members through dependency edges.
        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        for id in &checkpoint.member_node_ids {
            if reachable.insert(id.clone()) {
                queue.push_back(id.clone());
            }
        }
        while let Some(id) = queue.pop_front() {
            for edge in self.dependents(&id)? {
                if reachable.insert(edge.target_id.clone()) {
                    queue.push_back(edge.target_id);
                }
            }
        }

        let members: HashSet<&String> = checkpoint.member_node_ids.iter().collect();
        let mut invalidated = 0usize;
        for id in self.store().node_ids_created_after(checkpoint.created_at)? {
            if !reachable.contains(&id) || members.contains(&id) {
                continue;
            }
            let mut node = self.get_node(&id)?;
            if node.state.is_terminal() {
                continue;
            }
            let from = node.state;
            node.state = NodeState::Deprecated;
            node.updated_at = Utc::now();
            self.store().update_node(&node)?;
            let entry = AuditEntry::new(
                AuditAction::Rollback,
                &trigger,
                user_id,
                "created after checkpoint, invalidated by rollback",
            )
            .with_states(Some(from), NodeState::Deprecated);
            self.store().append_audit(&id, &entry)?;
            invalidated += 1;
        }

        let mut restored = 0usize;
        for snap in &checkpoint.snapshots {
            let mut node = self.get_node(&snap.node_id)?;
            let unchanged = node.state == snap.state
                && node.confidence == snap.confidence
                && node.priority_queue == snap.priority_queue;
            if unchanged {
                continue;
            }
            let from = node.state;
            let delta = snap.confidence as i16 - node.confidence as i16;
            node.state = snap.state;
            node.branch = snap.branch;
            node.confidence = snap.confidence;
            node.velocity = snap.velocity;
            node.priority_queue = snap.priority_queue;
            node.idle_cycles = 0;
            node.next_scan = Some(Utc::now() + snap.priority_queue.interval());
            node.updated_at = Utc::now();
            self.store().update_node(&node)?;

            let mut entry = AuditEntry::new(
                AuditAction::Rollback,
                &trigger,
                user_id,
                "restored to checkpoint snapshot",
            )
            .with_states(Some(from), snap.state);
            if delta != 0 {
                entry = entry.with_confidence_delta(delta);
            }
            self.store().append_audit(&snap.node_id, &entry)?;
            restored += 1;
        }

        info!(checkpoint = %checkpoint_id, invalidated, restored, "rollback complete");
        Ok(RollbackReport {
            invalidated_count: invalidated,
            restored_count: restored,
        })
    }
}
