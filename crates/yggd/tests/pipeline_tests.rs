//! End-to-end pipeline tests with fake adapters and an in-memory store.
//!
//! No network, no real models. These walk the full classify -> branches ->
//! council -> validate -> persist path and assert the response contract:
//! a verified answer with citations, or an explicit refusal.

use std::sync::Arc;
use std::time::Duration;

use yggd::council::adapters::{AdapterRegistry, FakeAdapter};
use yggd::council::Council;
use yggd::ledger::{CreateNodeOpts, Ledger, TransitionOpts};
use yggd::pipeline::Pipeline;
use yggd::search::NoopSearch;
use ygg_common::api::{QueryOptions, RefusalReason, StreamEvent, YggdrasilRequest};
use ygg_common::branch::Branch;
use ygg_common::council::CouncilMember;
use ygg_common::node::NodeState;
use ygg_common::source::{Source, SourceType};
use ygg_common::trace::FinalDecision;

fn request(query: &str) -> YggdrasilRequest {
    YggdrasilRequest {
        query: query.to_string(),
        user_id: "user-1".to_string(),
        session_id: None,
        context: None,
        include_trace: true,
        options: QueryOptions::default(),
    }
}

fn consensus_registry() -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    registry.insert(Arc::new(
        FakeAdapter::new(
            CouncilMember::Kvasir,
            "The speed of light in vacuum is 299,792,458 m/s.",
            95,
        )
        .with_reasoning(
            "The metre has been defined since 1983 so that the speed of light in vacuum \
             is exactly 299,792,458 m/s; this is a definition, not a measurement.",
        ),
    ));
    registry.insert(Arc::new(FakeAdapter::new(
        CouncilMember::Bragi,
        "Exactly 299,792,458 metres per second, by definition.",
        92,
    )));
    registry.insert(Arc::new(FakeAdapter::new(
        CouncilMember::Nornes,
        "Since 1983 the metre fixes c at 299,792,458 m/s.",
        88,
    )));
    Arc::new(registry)
}

fn seeded_ledger() -> Arc<Ledger> {
    let ledger = Ledger::open_in_memory().unwrap();
    let arxiv = Source::new(
        SourceType::Arxiv,
        "1905.11922",
        "https://arxiv.org/abs/1905.11922",
        "SI redefinition of the second and the metre",
        100,
    );
    let node = ledger
        .create_node(
            "The speed of light in vacuum is 299,792,458 m/s",
            CreateNodeOpts {
                confidence: 100,
                sources: vec![arxiv],
                ..Default::default()
            },
        )
        .unwrap();
    ledger
        .transition_state(
            &node.id,
            NodeState::Verified,
            TransitionOpts {
                trigger: "seed".to_string(),
                agent: "seed".to_string(),
                reason: "seeded fact".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    Arc::new(ledger)
}

fn pipeline(ledger: Arc<Ledger>, registry: Arc<AdapterRegistry>) -> Arc<Pipeline> {
    let council = Arc::new(Council::new(registry));
    Arc::new(Pipeline::new(ledger, council, Arc::new(NoopSearch)))
}

// ============================================================================
// Scenario: sourced factual query
// ============================================================================

#[tokio::test]
async fn sourced_factual_query_is_verified() {
    let pipeline = pipeline(seeded_ledger(), consensus_registry());
    let response = pipeline
        .process(&request("What is the speed of light in vacuum?"))
        .await
        .unwrap();

    assert!(response.is_verified);
    assert_eq!(response.confidence, 100);
    assert_eq!(response.branch, Some(Branch::Mimir));
    assert!(response.answer.unwrap().contains("299,792,458"));
    assert!(response.sources.iter().any(|s| s.trust_score == 100));
    assert!(response.deliberation_id.is_some());

    let trace = response.trace.unwrap();
    assert_eq!(trace.final_decision, FinalDecision::Approved);
    let phases: Vec<&str> = trace.steps.iter().map(|s| s.phase.as_str()).collect();
    assert!(phases.contains(&"classify"));
    assert!(phases.contains(&"fan_out_branches"));
    assert!(phases.contains(&"council_deliberate"));
    assert!(phases.contains(&"validate"));
    assert!(phases.contains(&"persist"));
}

#[tokio::test]
async fn verified_answer_is_persisted_with_attribution() {
    let ledger = seeded_ledger();
    let pipeline = pipeline(Arc::clone(&ledger), consensus_registry());
    let before = ledger.store().node_count().unwrap();

    let response = pipeline
        .process(&request("What is the speed of light in vacuum?"))
        .await
        .unwrap();
    assert!(response.is_verified);
    assert_eq!(ledger.store().node_count().unwrap(), before + 1);

    // The stored deliberation is retrievable by the id on the response.
    let deliberation = ledger
        .store()
        .get_deliberation(&response.deliberation_id.unwrap())
        .unwrap();
    assert_eq!(deliberation.responses.len(), 3);
    let pct: f64 = {
        use ygg_common::shapley;
        let report = shapley::attribute(
            &deliberation.responses,
            &deliberation.challenges,
            deliberation.verdict.kind,
        );
        report.attributions.iter().map(|a| a.percentage).sum()
    };
    assert!((pct - 100.0).abs() < 0.5);
}

// ============================================================================
// Scenario: unsourced claim
// ============================================================================

#[tokio::test]
async fn unsourced_claim_refuses_no_source() {
    // Empty ledger, no web search: branches return nothing, however
    // confident the council is.
    let ledger = Arc::new(Ledger::open_in_memory().unwrap());
    let pipeline = pipeline(ledger, consensus_registry());

    let response = pipeline
        .process(&request("Is dark matter conscious?"))
        .await
        .unwrap();

    assert!(!response.is_verified);
    assert_eq!(response.confidence, 0);
    assert!(response.answer.is_none());
    assert_eq!(response.refusal_reason, Some(RefusalReason::NoSource));
    assert!(response.sources.is_empty());
}

// ============================================================================
// Scenario: council deadlock
// ============================================================================

#[tokio::test]
async fn split_council_refuses_no_consensus() {
    // Anchored VOLVA evidence exists, so the refusal comes from the
    // verdict, not the anchor check.
    let ledger = Ledger::open_in_memory().unwrap();
    let pubmed = Source::new(
        SourceType::Pubmed,
        "123456",
        "https://pubmed.ncbi.nlm.nih.gov/123456",
        "A contested meta-analysis",
        85,
    );
    ledger
        .create_node(
            "Election fraud claims and their verification status",
            CreateNodeOpts {
                confidence: 70,
                sources: vec![pubmed],
                ..Default::default()
            },
        )
        .unwrap();

    let mut registry = AdapterRegistry::new();
    registry.insert(Arc::new(FakeAdapter::new(CouncilMember::Kvasir, "supported", 80)));
    registry.insert(Arc::new(FakeAdapter::new(CouncilMember::Bragi, "supported", 75)));
    registry.insert(Arc::new(FakeAdapter::new(CouncilMember::Nornes, "refuted", 30)));
    registry.insert(Arc::new(FakeAdapter::new(CouncilMember::Saga, "refuted", 20)));

    let pipeline = pipeline(Arc::new(ledger), Arc::new(registry));
    let response = pipeline
        .process(&request("Is election fraud widespread?"))
        .await
        .unwrap();

    assert!(!response.is_verified);
    assert_eq!(response.refusal_reason, Some(RefusalReason::NoConsensus));
    assert!(response.deliberation_id.is_some());
}

// ============================================================================
// Timeout
// ============================================================================

#[tokio::test]
async fn expired_deadline_refuses_with_partial_trace() {
    let mut registry = AdapterRegistry::new();
    registry.insert(Arc::new(
        FakeAdapter::new(CouncilMember::Kvasir, "slow answer", 95)
            .with_delay(Duration::from_secs(5)),
    ));

    let pipeline = pipeline(seeded_ledger(), Arc::new(registry));
    let mut req = request("What is the speed of light in vacuum?");
    req.options.max_time_ms = 80;

    let response = pipeline.process(&req).await.unwrap();
    assert!(!response.is_verified);
    assert_eq!(response.refusal_reason, Some(RefusalReason::Timeout));
    assert!(response.answer.is_none());

    // The partial trace is always attached to timeout refusals.
    let trace = response.trace.unwrap();
    assert_eq!(trace.final_decision, FinalDecision::Rejected);
    assert!(!trace.steps.is_empty());
}

// ============================================================================
// Thinking and streaming surfaces
// ============================================================================

#[tokio::test]
async fn thinking_steps_cover_the_phases() {
    let pipeline = pipeline(seeded_ledger(), consensus_registry());
    let (response, thinking) = pipeline
        .process_with_thinking(&request("What is the speed of light in vacuum?"))
        .await
        .unwrap();

    assert!(response.is_verified);
    assert!(!thinking.is_empty());
    let phases: Vec<&str> = thinking.iter().map(|s| s.phase.as_str()).collect();
    assert!(phases.contains(&"classify"));
    assert!(phases.contains(&"persist"));
}

#[tokio::test]
async fn stream_ends_with_exactly_one_terminal_event() {
    let pipeline = pipeline(seeded_ledger(), consensus_registry());
    let mut rx = pipeline.process_with_streaming(request("What is the speed of light in vacuum?"));

    let mut thinking = 0usize;
    let mut terminals = 0usize;
    let mut verified = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Thinking(_) => {
                assert_eq!(terminals, 0, "thinking after terminal event");
                thinking += 1;
            }
            StreamEvent::Response(response) => {
                terminals += 1;
                verified = response.is_verified;
            }
            StreamEvent::Error { .. } => terminals += 1,
        }
    }
    assert!(thinking > 0);
    assert_eq!(terminals, 1);
    assert!(verified);
}

// ============================================================================
// Response contract
// ============================================================================

#[tokio::test]
async fn response_serde_round_trips() {
    let pipeline = pipeline(seeded_ledger(), consensus_registry());
    let response = pipeline
        .process(&request("What is the speed of light in vacuum?"))
        .await
        .unwrap();

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"isVerified\":true"));
    assert!(json.contains("\"branch\":\"MIMIR\""));

    let back: ygg_common::api::YggdrasilResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back.trace.as_ref().unwrap(), response.trace.as_ref().unwrap());
    assert_eq!(back.confidence, 100);
}

#[tokio::test]
async fn no_registered_adapters_never_fabricates() {
    let pipeline = pipeline(seeded_ledger(), Arc::new(AdapterRegistry::new()));
    let response = pipeline
        .process(&request("What is the speed of light in vacuum?"))
        .await
        .unwrap();

    // Evidence exists, but an empty council deadlocks and Odin refuses.
    assert!(!response.is_verified);
    assert_eq!(response.refusal_reason, Some(RefusalReason::NoConsensus));
    assert!(response.answer.is_none());
}
