//! Strength-propagated cascade invalidation.
//!
//! BFS from the invalidated root over the `source -> target` edge table.
//! A visited set guarantees each node is reached at most once, so cycles
//! terminate. Dependents hanging on a strong edge (strength >= 0.8) are
//! deprecated outright; weaker dependents go to the HOT queue for review.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use tracing::info;

use ygg_common::graph::{CascadeResult, CASCADE_STRENGTH_THRESHOLD};
use ygg_common::node::PriorityQueue;
use ygg_common::{YggError, YggResult};

use super::{Ledger, TransitionOpts};
use ygg_common::node::NodeState;

impl Ledger {
    /// Invalidate `root_id` and everything strongly dependent on it.
    ///
    /// Runs single-threaded per root; concurrent cascades on disjoint
    /// subgraphs are serialized per node by the store.
    pub fn cascade_invalidate(
        &self,
        root_id: &str,
        invalidator: &str,
        reason: &str,
    ) -> YggResult<CascadeResult> {
        if !self.store().node_exists(root_id)? {
            return Err(YggError::NotFound(root_id.to_string()));
        }

        let started = Instant::now();
        let trigger = format!("cascade:{}", root_id);

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut invalidated: Vec<String> = Vec::new();
        let mut review: Vec<String> = Vec::new();

        visited.insert(root_id.to_string());
        queue.push_back(root_id.to_string());

        while let Some(id) = queue.pop_front() {
            let node = self.get_node(&id)?;
            if !node.state.is_terminal() {
                self.transition_state(
                    &id,
                    NodeState::Deprecated,
                    TransitionOpts {
                        trigger: trigger.clone(),
                        agent: invalidator.to_string(),
                        reason: reason.to_string(),
                        new_confidence: None,
                        vote_record: None,
                    },
                )?;
                invalidated.push(id.clone());
            }

            for edge in self.dependents(&id)? {
                if edge.strength >= CASCADE_STRENGTH_THRESHOLD {
                    if visited.insert(edge.target_id.clone()) {
                        queue.push_back(edge.target_id);
                    }
                } else if !visited.contains(&edge.target_id) && !review.contains(&edge.target_id) {
                    review.push(edge.target_id);
                }
            }
        }

        // A node reachable through both a strong and a weak edge was
        // invalidated above; it does not also get reviewed.
        review.retain(|id| !visited.contains(id));
        for id in &review {
            self.schedule_review(id, PriorityQueue::Hot, &trigger, invalidator, reason)?;
        }

        let result = CascadeResult {
            root_id: root_id.to_string(),
            invalidated,
            review_scheduled: review,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            root = %root_id,
            invalidated = result.invalidated_count(),
            review = result.review_count(),
            "cascade complete"
        );
        Ok(result)
    }
}
