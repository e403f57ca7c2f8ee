//! Knowledge Ledger invariant tests.
//!
//! These are DETERMINISTIC - in-memory SQLite, no network, no LLM.
//! They cover the branch/confidence partition, the append-only audit
//! trail, promotion-needs-proof, and the watcher bookkeeping rules.

use std::collections::HashMap;

use yggd::ledger::{CreateNodeOpts, Ledger, ScanUpdate, TransitionOpts};
use ygg_common::branch::Branch;
use ygg_common::node::{NodeState, PriorityQueue};
use ygg_common::source::{Source, SourceType};
use ygg_common::YggError;

fn ledger() -> Ledger {
    Ledger::open_in_memory().unwrap()
}

fn transition(trigger: &str, reason: &str) -> TransitionOpts {
    TransitionOpts {
        trigger: trigger.to_string(),
        agent: "test".to_string(),
        reason: reason.to_string(),
        new_confidence: None,
        vote_record: None,
    }
}

fn anchored_source(trust: u8) -> Source {
    Source::new(
        SourceType::Arxiv,
        "2101.00001",
        "https://arxiv.org/abs/2101.00001",
        "An anchored paper",
        trust,
    )
}

// ============================================================================
// Branch/confidence partition
// ============================================================================

#[test]
fn create_respects_partition() {
    let ledger = ledger();

    for (confidence, branch) in [(0u8, Branch::Hugin), (49, Branch::Hugin), (50, Branch::Volva), (99, Branch::Volva), (100, Branch::Mimir)] {
        let node = ledger
            .create_node(
                &format!("statement at {}", confidence),
                CreateNodeOpts {
                    confidence,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(node.branch, branch, "confidence {}", confidence);
    }
}

#[test]
fn create_with_mismatched_branch_fails() {
    let ledger = ledger();
    let result = ledger.create_node(
        "a claim",
        CreateNodeOpts {
            confidence: 30,
            branch: Some(Branch::Mimir),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(YggError::BranchViolation { .. })));
}

#[test]
fn confidence_change_moves_branch() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 30, ..Default::default() })
        .unwrap();
    assert_eq!(node.branch, Branch::Hugin);

    let updated = ledger
        .transition_state(
            &node.id,
            NodeState::Watching,
            TransitionOpts {
                new_confidence: Some(65),
                ..transition("test", "fresh evidence")
            },
        )
        .unwrap();
    assert_eq!(updated.branch, Branch::Volva);
    assert_eq!(updated.confidence, 65);
}

// ============================================================================
// Append-only audit
// ============================================================================

#[test]
fn every_change_appends_exactly_one_entry() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();
    assert_eq!(ledger.audit_trail(&node.id).unwrap().len(), 1); // CREATE

    ledger
        .transition_state(&node.id, NodeState::Watching, transition("test", "watching"))
        .unwrap();
    assert_eq!(ledger.audit_trail(&node.id).unwrap().len(), 2);

    ledger
        .schedule_review(&node.id, PriorityQueue::Hot, "test", "test", "review")
        .unwrap();
    let trail = ledger.audit_trail(&node.id).unwrap();
    assert_eq!(trail.len(), 3);

    // Entries are ordered and earlier entries are untouched.
    assert_eq!(trail[0].action.as_str(), "CREATE");
    assert_eq!(trail[1].action.as_str(), "TRANSITION");
    assert_eq!(trail[2].action.as_str(), "QUEUE_CHANGE");
}

#[test]
fn audit_trail_length_never_decreases() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();

    let mut last_len = 0;
    for i in 0..5 {
        ledger
            .transition_state(
                &node.id,
                NodeState::Watching,
                TransitionOpts {
                    new_confidence: Some(40 + i),
                    ..transition("test", "tick")
                },
            )
            .unwrap();
        let len = ledger.audit_trail(&node.id).unwrap().len();
        assert!(len > last_len);
        last_len = len;
    }
}

// ============================================================================
// No promotion without proof
// ============================================================================

#[test]
fn verified_requires_anchored_source() {
    let ledger = ledger();
    let node = ledger
        .create_node("a volva claim", CreateNodeOpts { confidence: 80, ..Default::default() })
        .unwrap();

    let result = ledger.transition_state(&node.id, NodeState::Verified, transition("test", "try"));
    assert!(matches!(result, Err(YggError::VerificationUnsupported { .. })));

    // Trust 79 is below the anchor threshold.
    ledger.attach_source(&node.id, &anchored_source(79)).unwrap();
    let result = ledger.transition_state(&node.id, NodeState::Verified, transition("test", "try"));
    assert!(matches!(result, Err(YggError::VerificationUnsupported { .. })));

    // Trust 80 anchors it. The upsert by (type, identifier) replaces the
    // weak entry rather than duplicating it.
    ledger.attach_source(&node.id, &anchored_source(85)).unwrap();
    let verified = ledger
        .transition_state(&node.id, NodeState::Verified, transition("test", "anchored"))
        .unwrap();
    assert_eq!(verified.state, NodeState::Verified);
}

#[test]
fn hugin_never_verifies_directly() {
    let ledger = ledger();
    let node = ledger
        .create_node(
            "an unverified web claim",
            CreateNodeOpts {
                confidence: 30,
                sources: vec![anchored_source(100)],
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(node.branch, Branch::Hugin);

    // Even with a perfect source attached, HUGIN cannot jump to VERIFIED.
    let result = ledger.transition_state(
        &node.id,
        NodeState::Verified,
        TransitionOpts {
            new_confidence: Some(100),
            ..transition("test", "jump")
        },
    );
    assert!(matches!(result, Err(YggError::VerificationUnsupported { .. })));

    // Passing through VOLVA with the evidence first is the legal path.
    ledger
        .transition_state(
            &node.id,
            NodeState::Watching,
            TransitionOpts {
                new_confidence: Some(75),
                ..transition("test", "fresh evidence")
            },
        )
        .unwrap();
    let verified = ledger
        .transition_state(&node.id, NodeState::Verified, transition("test", "now anchored"))
        .unwrap();
    assert_eq!(verified.state, NodeState::Verified);
    assert_eq!(verified.branch, Branch::Volva);
}

#[test]
fn mimir_verification_needs_validated_provider() {
    let ledger = ledger();
    let web = Source::new(SourceType::Web, "example.com/a", "https://example.com/a", "good blog", 90);
    let node = ledger
        .create_node(
            "a would-be fact",
            CreateNodeOpts {
                confidence: 100,
                sources: vec![web],
                ..Default::default()
            },
        )
        .unwrap();

    // Anchored (trust 90) but not a validated provider: MIMIR refuses.
    let result = ledger.transition_state(&node.id, NodeState::Verified, transition("test", "try"));
    assert!(matches!(result, Err(YggError::VerificationUnsupported { .. })));

    ledger.attach_source(&node.id, &anchored_source(100)).unwrap();
    let verified = ledger
        .transition_state(&node.id, NodeState::Verified, transition("test", "arxiv"))
        .unwrap();
    assert_eq!(verified.state, NodeState::Verified);
    assert_eq!(verified.branch, Branch::Mimir);
}

// ============================================================================
// Transitions and terminal states
// ============================================================================

#[test]
fn unknown_node_is_not_found() {
    let ledger = ledger();
    let result = ledger.transition_state("no-such-id", NodeState::Watching, transition("t", "r"));
    assert!(matches!(result, Err(YggError::NotFound(_))));
}

#[test]
fn terminal_states_are_sticky() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();
    ledger
        .transition_state(&node.id, NodeState::Rejected, transition("test", "disproved"))
        .unwrap();

    let result = ledger.transition_state(&node.id, NodeState::Watching, transition("test", "revive"));
    assert!(result.is_err());

    // Retained, not deleted.
    assert_eq!(ledger.get_node(&node.id).unwrap().state, NodeState::Rejected);
}

// ============================================================================
// Watcher bookkeeping
// ============================================================================

#[test]
fn three_idle_scans_demote_step_by_step() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();
    ledger
        .schedule_review(&node.id, PriorityQueue::Hot, "test", "test", "hot")
        .unwrap();

    let idle = ScanUpdate { changed: false, new_confidence: None };

    // Three misses: HOT -> WARM.
    for _ in 0..2 {
        let outcome = ledger.update_scan_status(&node.id, idle).unwrap();
        assert!(!outcome.demoted);
        assert_eq!(outcome.node.priority_queue, PriorityQueue::Hot);
    }
    let outcome = ledger.update_scan_status(&node.id, idle).unwrap();
    assert!(outcome.demoted);
    assert_eq!(outcome.node.priority_queue, PriorityQueue::Warm);
    assert_eq!(outcome.node.idle_cycles, 0);

    // Three more: WARM -> COLD.
    for _ in 0..2 {
        assert!(!ledger.update_scan_status(&node.id, idle).unwrap().demoted);
    }
    let outcome = ledger.update_scan_status(&node.id, idle).unwrap();
    assert!(outcome.demoted);
    assert_eq!(outcome.node.priority_queue, PriorityQueue::Cold);
}

#[test]
fn changed_scan_resets_idle_cycles() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();
    ledger
        .schedule_review(&node.id, PriorityQueue::Hot, "test", "test", "hot")
        .unwrap();

    let idle = ScanUpdate { changed: false, new_confidence: None };
    ledger.update_scan_status(&node.id, idle).unwrap();
    ledger.update_scan_status(&node.id, idle).unwrap();

    let outcome = ledger
        .update_scan_status(&node.id, ScanUpdate { changed: true, new_confidence: Some(43) })
        .unwrap();
    assert_eq!(outcome.node.idle_cycles, 0);
    assert_eq!(outcome.node.confidence, 43);

    // The counter restarted; two more misses do not demote.
    ledger.update_scan_status(&node.id, idle).unwrap();
    let outcome = ledger.update_scan_status(&node.id, idle).unwrap();
    assert!(!outcome.demoted);
}

#[test]
fn scan_updates_set_next_scan() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();
    let outcome = ledger
        .update_scan_status(&node.id, ScanUpdate { changed: false, new_confidence: None })
        .unwrap();
    let next = outcome.node.next_scan.unwrap();
    assert!(next > chrono::Utc::now());
    assert!(outcome.node.last_scan.is_some());
}

// ============================================================================
// Dependencies and attribution
// ============================================================================

#[test]
fn dependency_upserts_on_source_target() {
    let ledger = ledger();
    let a = ledger.create_node("a", CreateNodeOpts { confidence: 40, ..Default::default() }).unwrap();
    let b = ledger.create_node("b", CreateNodeOpts { confidence: 40, ..Default::default() }).unwrap();

    ledger
        .add_dependency(&a.id, &b.id, ygg_common::DependencyRelation::Supports, 0.5)
        .unwrap();
    ledger
        .add_dependency(&a.id, &b.id, ygg_common::DependencyRelation::DerivedFrom, 0.9)
        .unwrap();

    let edges = ledger.dependents(&a.id).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].strength, 0.9);
}

#[test]
fn dependency_strength_is_validated() {
    let ledger = ledger();
    let a = ledger.create_node("a", CreateNodeOpts { confidence: 40, ..Default::default() }).unwrap();
    let b = ledger.create_node("b", CreateNodeOpts { confidence: 40, ..Default::default() }).unwrap();
    assert!(ledger
        .add_dependency(&a.id, &b.id, ygg_common::DependencyRelation::Assumes, 1.2)
        .is_err());
    assert!(ledger
        .add_dependency(&a.id, "missing", ygg_common::DependencyRelation::Assumes, 0.5)
        .is_err());
}

#[test]
fn shapley_contributions_accumulate() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 40, ..Default::default() })
        .unwrap();

    let mut first = HashMap::new();
    first.insert("KVASIR".to_string(), 60.0);
    first.insert("BRAGI".to_string(), 40.0);
    ledger.update_shapley_attribution(&node.id, &first).unwrap();

    let mut second = HashMap::new();
    second.insert("KVASIR".to_string(), 10.0);
    ledger.update_shapley_attribution(&node.id, &second).unwrap();

    let reloaded = ledger.get_node(&node.id).unwrap();
    assert_eq!(reloaded.shapley_attribution.get("KVASIR"), Some(&70.0));
    assert_eq!(reloaded.shapley_attribution.get("BRAGI"), Some(&40.0));
}

#[test]
fn sources_are_unique_by_identity() {
    let ledger = ledger();
    let node = ledger
        .create_node("a claim", CreateNodeOpts { confidence: 60, ..Default::default() })
        .unwrap();
    ledger.attach_source(&node.id, &anchored_source(85)).unwrap();
    ledger.attach_source(&node.id, &anchored_source(90)).unwrap();

    let sources = ledger.sources_for(&node.id).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].trust_score, 90);
}
