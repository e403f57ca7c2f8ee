//! The Knowledge Ledger.
//!
//! Node CRUD, the state machine, dependency edges, and the audit trail.
//! Invariants enforced here, not in callers:
//!
//! - branch and confidence always belong to the same partition cell
//! - every state, confidence, or queue change appends exactly one audit
//!   entry; if the entry cannot be written the change is rolled back
//! - a transition to VERIFIED requires an anchored source (trust >= 80),
//!   and HUGIN nodes can never reach VERIFIED directly

pub mod cascade;
pub mod checkpoint;
pub mod store;

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

use ygg_common::audit::{AuditAction, AuditEntry};
use ygg_common::branch::{check_partition, Branch};
use ygg_common::graph::{DependencyEdge, DependencyRelation};
use ygg_common::node::{
    compute_velocity, normalize_statement, queue_for_velocity, KnowledgeNode, NodeState,
    PriorityQueue, IDLE_CYCLES_BEFORE_DEMOTION,
};
use ygg_common::source::Source;
use ygg_common::{YggError, YggResult};

use store::Store;

/// Options for [`Ledger::create_node`].
#[derive(Debug, Clone)]
pub struct CreateNodeOpts {
    pub confidence: u8,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    /// Explicit branch; must match `confidence` or creation fails.
    pub branch: Option<Branch>,
    pub sources: Vec<Source>,
    pub trigger: String,
    pub agent: String,
}

impl Default for CreateNodeOpts {
    fn default() -> Self {
        Self {
            confidence: 25,
            domain: None,
            tags: Vec::new(),
            branch: None,
            sources: Vec::new(),
            trigger: "pipeline".to_string(),
            agent: "yggdrasil".to_string(),
        }
    }
}

/// Options for [`Ledger::transition_state`].
#[derive(Debug, Clone, Default)]
pub struct TransitionOpts {
    pub trigger: String,
    pub agent: String,
    pub reason: String,
    pub new_confidence: Option<u8>,
    pub vote_record: Option<serde_json::Value>,
}

/// Watcher scan report for one node.
#[derive(Debug, Clone, Copy)]
pub struct ScanUpdate {
    pub changed: bool,
    pub new_confidence: Option<u8>,
}

/// What the ledger did with a scan report.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub node: KnowledgeNode,
    pub demoted: bool,
}

/// The ledger. Shared behind an `Arc`; all methods take `&self`.
pub struct Ledger {
    store: Store,
}

impl Ledger {
    pub fn open(path: &str) -> YggResult<Self> {
        Ok(Self {
            store: Store::open(path)?,
        })
    }

    pub fn open_in_memory() -> YggResult<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a node. State starts at PENDING_PROOF, or WATCHING when
    /// evidence is already attached. Appends the CREATE audit entry.
    pub fn create_node(&self, statement: &str, opts: CreateNodeOpts) -> YggResult<KnowledgeNode> {
        let statement = normalize_statement(statement)?;

        let branch = match opts.branch {
            Some(branch) => {
                check_partition(branch, opts.confidence)?;
                branch
            }
            None => {
                if opts.confidence > 100 {
                    return Err(YggError::InvalidInput(format!(
                        "confidence {} out of range",
                        opts.confidence
                    )));
                }
                Branch::for_confidence(opts.confidence)
            }
        };

        let state = if opts.sources.is_empty() {
            NodeState::PendingProof
        } else {
            NodeState::Watching
        };

        let now = Utc::now();
        let queue = queue_for_velocity(0.0);
        let node = KnowledgeNode {
            id: uuid::Uuid::new_v4().to_string(),
            statement,
            domain: opts.domain,
            tags: opts.tags,
            branch,
            state,
            confidence: opts.confidence,
            velocity: 0.0,
            priority_queue: queue,
            last_scan: None,
            next_scan: Some(now + queue.interval()),
            idle_cycles: 0,
            shapley_attribution: HashMap::new(),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_node(&node)?;
        for source in &opts.sources {
            let source_id = self.store.upsert_source(source)?;
            self.store.link_source(&node.id, &source_id)?;
        }

        let entry = AuditEntry::new(AuditAction::Create, &opts.trigger, &opts.agent, "node created")
            .with_states(None, state);
        if let Err(e) = self.append_audit_with_retry(&node.id, &entry) {
            // No audit, no node: undo the insert so the trail stays total.
            let _ = self.store.delete_node(&node.id);
            return Err(e);
        }

        debug!(node_id = %node.id, branch = %branch, "node created");
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_node(&self, id: &str) -> YggResult<KnowledgeNode> {
        self.store.get_node(id)
    }

    pub fn audit_trail(&self, id: &str) -> YggResult<Vec<AuditEntry>> {
        if !self.store.node_exists(id)? {
            return Err(YggError::NotFound(id.to_string()));
        }
        self.store.audit_trail(id)
    }

    pub fn sources_for(&self, id: &str) -> YggResult<Vec<Source>> {
        self.store.sources_for(id)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Transition a node's state and optionally its confidence.
    ///
    /// On confidence change the velocity is recomputed from the wall-time
    /// delta since the last write and the queue re-derived. Exactly one
    /// TRANSITION audit entry is appended; on audit failure the node row
    /// is restored and the error propagated.
    pub fn transition_state(
        &self,
        id: &str,
        new_state: NodeState,
        opts: TransitionOpts,
    ) -> YggResult<KnowledgeNode> {
        let prev = self.store.get_node(id)?;

        if prev.state.is_terminal() && new_state != prev.state {
            return Err(YggError::InvalidInput(format!(
                "node {} is {} and cannot transition",
                id, prev.state
            )));
        }

        let new_confidence = opts.new_confidence.unwrap_or(prev.confidence);
        if new_confidence > 100 {
            return Err(YggError::BranchViolation {
                branch: prev.branch,
                confidence: new_confidence,
            });
        }
        let new_branch = Branch::for_confidence(new_confidence);

        if new_state == NodeState::Verified {
            self.check_verification_support(&prev, new_branch)?;
        }

        let now = Utc::now();
        let mut node = prev.clone();
        let mut entry = AuditEntry::new(AuditAction::Transition, &opts.trigger, &opts.agent, &opts.reason)
            .with_states(Some(prev.state), new_state);

        if new_confidence != prev.confidence {
            let dt_ms = (now - prev.updated_at).num_milliseconds();
            node.velocity = compute_velocity(prev.confidence, new_confidence, dt_ms);
            let queue = queue_for_velocity(node.velocity);
            if queue != node.priority_queue {
                node.priority_queue = queue;
                node.idle_cycles = 0;
            }
            node.next_scan = Some(now + node.priority_queue.interval());
            entry = entry.with_confidence_delta(new_confidence as i16 - prev.confidence as i16);
        }

        node.state = new_state;
        node.confidence = new_confidence;
        node.branch = new_branch;
        node.updated_at = now;
        if let Some(record) = opts.vote_record.clone() {
            entry = entry.with_vote_record(record);
        }

        self.store.update_node(&node)?;
        if let Err(e) = self.append_audit_with_retry(id, &entry) {
            // Roll the state change back rather than leave a silent gap in
            // the trail.
            let _ = self.store.update_node(&prev);
            return Err(e);
        }

        debug!(node_id = %id, from = %prev.state, to = %new_state, "transition");
        Ok(node)
    }

    /// VERIFIED needs an anchored, branch-compatible source, and HUGIN
    /// may never reach VERIFIED without passing through VOLVA first.
    fn check_verification_support(&self, node: &KnowledgeNode, target_branch: Branch) -> YggResult<()> {
        if node.branch == Branch::Hugin {
            return Err(YggError::VerificationUnsupported {
                node_id: node.id.clone(),
                reason: "HUGIN nodes must pass through VOLVA with fresh evidence".to_string(),
            });
        }
        let sources = self.store.sources_for(&node.id)?;
        let anchored: Vec<&Source> = sources.iter().filter(|s| s.is_anchor()).collect();
        if anchored.is_empty() {
            return Err(YggError::VerificationUnsupported {
                node_id: node.id.clone(),
                reason: "no anchored source with trust >= 80".to_string(),
            });
        }
        if target_branch == Branch::Mimir && !anchored.iter().any(|s| s.is_mimir_grade()) {
            return Err(YggError::VerificationUnsupported {
                node_id: node.id.clone(),
                reason: "MIMIR verification needs a trust-100 validated provider".to_string(),
            });
        }
        Ok(())
    }

    /// Attach (upserting by identity) a source to a node.
    pub fn attach_source(&self, node_id: &str, source: &Source) -> YggResult<()> {
        if !self.store.node_exists(node_id)? {
            return Err(YggError::NotFound(node_id.to_string()));
        }
        let source_id = self.store.upsert_source(source)?;
        self.store.link_source(node_id, &source_id)
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    /// Upsert the `(source, target)` edge.
    pub fn add_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        relation: DependencyRelation,
        strength: f64,
    ) -> YggResult<()> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(YggError::InvalidInput(format!(
                "edge strength {} outside [0, 1]",
                strength
            )));
        }
        for id in [source_id, target_id] {
            if !self.store.node_exists(id)? {
                return Err(YggError::NotFound(id.to_string()));
            }
        }
        self.store.upsert_dependency(&DependencyEdge {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            strength,
        })
    }

    pub fn dependents(&self, source_id: &str) -> YggResult<Vec<DependencyEdge>> {
        self.store.dependents(source_id)
    }

    // ------------------------------------------------------------------
    // Watcher bookkeeping
    // ------------------------------------------------------------------

    /// Move a node into `queue` for review, zeroing its idle cycles.
    pub fn schedule_review(
        &self,
        id: &str,
        queue: PriorityQueue,
        trigger: &str,
        agent: &str,
        reason: &str,
    ) -> YggResult<KnowledgeNode> {
        let mut node = self.store.get_node(id)?;
        let prev_queue = node.priority_queue;
        let now = Utc::now();
        node.priority_queue = queue;
        node.idle_cycles = 0;
        node.next_scan = Some(now + queue.interval());
        node.updated_at = now;
        self.store.update_node(&node)?;

        let entry = AuditEntry::new(AuditAction::QueueChange, trigger, agent, reason)
            .with_states(Some(node.state), node.state);
        if let Err(e) = self.append_audit_with_retry(id, &entry) {
            warn!(node_id = %id, "queue change audit failed, rolling back");
            let mut restored = node.clone();
            restored.priority_queue = prev_queue;
            let _ = self.store.update_node(&restored);
            return Err(e);
        }
        Ok(node)
    }

    /// Record the outcome of one watcher scan.
    ///
    /// An unchanged scan increments `idle_cycles`; at three the queue is
    /// demoted one step (HOT -> WARM -> COLD) and the counter resets. A
    /// changed scan with a new confidence routes through
    /// [`Ledger::transition_state`] so velocity and audit stay consistent.
    /// Either way `next_scan` moves to now + the queue's interval.
    pub fn update_scan_status(&self, id: &str, update: ScanUpdate) -> YggResult<ScanOutcome> {
        let now = Utc::now();
        let mut demoted = false;

        if update.changed {
            if let Some(new_confidence) = update.new_confidence {
                let current = self.store.get_node(id)?;
                if new_confidence != current.confidence {
                    self.transition_state(
                        id,
                        current.state,
                        TransitionOpts {
                            trigger: "watcher".to_string(),
                            agent: "huginn-scan".to_string(),
                            reason: "rescan produced new confidence".to_string(),
                            new_confidence: Some(new_confidence),
                            vote_record: None,
                        },
                    )?;
                }
            }
            let mut node = self.store.get_node(id)?;
            node.idle_cycles = 0;
            node.last_scan = Some(now);
            node.next_scan = Some(now + node.priority_queue.interval());
            node.updated_at = now;
            self.store.update_node(&node)?;
            return Ok(ScanOutcome { node, demoted });
        }

        let mut node = self.store.get_node(id)?;
        node.idle_cycles += 1;
        if node.idle_cycles >= IDLE_CYCLES_BEFORE_DEMOTION && node.priority_queue != PriorityQueue::Cold
        {
            let from = node.priority_queue;
            node.priority_queue = node.priority_queue.demoted();
            node.idle_cycles = 0;
            demoted = true;

            let entry = AuditEntry::new(
                AuditAction::QueueChange,
                "watcher",
                "huginn-scan",
                &format!("{} idle cycles, demoted {} -> {}", IDLE_CYCLES_BEFORE_DEMOTION, from, node.priority_queue),
            )
            .with_states(Some(node.state), node.state);
            self.append_audit_with_retry(id, &entry)?;
        } else if node.idle_cycles >= IDLE_CYCLES_BEFORE_DEMOTION {
            // Already COLD: reset the counter, nothing to demote into.
            node.idle_cycles = 0;
        }
        node.last_scan = Some(now);
        node.next_scan = Some(now + node.priority_queue.interval());
        node.updated_at = now;
        self.store.update_node(&node)?;
        Ok(ScanOutcome { node, demoted })
    }

    // ------------------------------------------------------------------
    // Attribution
    // ------------------------------------------------------------------

    /// Merge per-member contribution percentages into the node's
    /// cumulative attribution.
    pub fn update_shapley_attribution(
        &self,
        id: &str,
        contributions: &HashMap<String, f64>,
    ) -> YggResult<()> {
        if !self.store.node_exists(id)? {
            return Err(YggError::NotFound(id.to_string()));
        }
        self.store.merge_shapley(id, contributions)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// One replay on transient failure, per the audit write policy.
    fn append_audit_with_retry(&self, node_id: &str, entry: &AuditEntry) -> YggResult<()> {
        match self.store.append_audit(node_id, entry) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(node_id = %node_id, error = %first, "audit append failed, replaying once");
                self.store.append_audit(node_id, entry)
            }
        }
    }
}
