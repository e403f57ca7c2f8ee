//! The pipeline orchestrator.
//!
//! classify -> fan_out_branches -> council_deliberate -> validate ->
//! persist, with the request deadline checked at every phase boundary.
//! Expiry returns a TIMEOUT refusal carrying the partial trace; an
//! unsourced answer is never emitted, under any failure mode.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

use ygg_common::api::{RefusalReason, StreamEvent, YggdrasilRequest, YggdrasilResponse};
use ygg_common::branch::Branch;
use ygg_common::classifier::classify;
use ygg_common::node::NodeState;
use ygg_common::shapley;
use ygg_common::trace::{FinalDecision, PipelinePhase, ThinkingStep, TraceBuilder, TraceStep};
use ygg_common::YggResult;

use crate::branches::{BranchEvidence, BranchHandlers};
use crate::council::{Council, CouncilRequest};
use crate::ledger::{CreateNodeOpts, Ledger, TransitionOpts};
use crate::odin::{self, ValidationInput};
use crate::search::UnverifiedSearch;

/// Statement cap for persisted answers, under the node limit with room
/// for a clean char boundary.
const PERSIST_STATEMENT_BYTES: usize = 4_000;

/// The orchestrator. Shared behind an `Arc` by the HTTP layer.
pub struct Pipeline {
    ledger: Arc<Ledger>,
    council: Arc<Council>,
    branches: BranchHandlers,
}

impl Pipeline {
    pub fn new(ledger: Arc<Ledger>, council: Arc<Council>, search: Arc<dyn UnverifiedSearch>) -> Self {
        let branches = BranchHandlers::new(Arc::clone(&ledger), search);
        Self {
            ledger,
            council,
            branches,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn council(&self) -> &Arc<Council> {
        &self.council
    }

    /// Process a request to a response.
    pub async fn process(&self, request: &YggdrasilRequest) -> YggResult<YggdrasilResponse> {
        self.run(request, None).await
    }

    /// Process and return the emitted thinking steps alongside the
    /// response.
    pub async fn process_with_thinking(
        &self,
        request: &YggdrasilRequest,
    ) -> YggResult<(YggdrasilResponse, Vec<ThinkingStep>)> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = self.run(request, Some(&tx)).await?;
        drop(tx);
        let mut thinking = Vec::new();
        while let Ok(step) = rx.try_recv() {
            thinking.push(step);
        }
        Ok((response, thinking))
    }

    /// Process as a lazy event sequence. The stream ends with exactly one
    /// `response` or `error` event.
    pub fn process_with_streaming(self: Arc<Self>, request: YggdrasilRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        tokio::spawn(async move {
            let (think_tx, mut think_rx) = mpsc::unbounded_channel::<ThinkingStep>();
            let forwarder = {
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(step) = think_rx.recv().await {
                        if tx.send(StreamEvent::Thinking(step)).await.is_err() {
                            break;
                        }
                    }
                })
            };

            let result = self.run(&request, Some(&think_tx)).await;
            drop(think_tx);
            let _ = forwarder.await;

            let terminal = match result {
                Ok(response) => StreamEvent::Response(Box::new(response)),
                Err(e) => {
                    warn!(error = %e, "pipeline error surfaced on stream");
                    StreamEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(terminal).await;
        });
        rx
    }

    async fn run(
        &self,
        request: &YggdrasilRequest,
        thinking: Option<&mpsc::UnboundedSender<ThinkingStep>>,
    ) -> YggResult<YggdrasilResponse> {
        let started = Instant::now();
        let budget = Duration::from_millis(request.options.max_time_ms.max(1));
        let request_id = uuid::Uuid::new_v4().to_string();
        let want_trace = request.include_trace || request.options.return_trace;
        let mut trace = TraceBuilder::new();

        let emit = |phase: PipelinePhase, thought: String| {
            if let Some(tx) = thinking {
                let _ = tx.send(ThinkingStep::new(phase, thought));
            }
        };

        // --- classify ---
        emit(PipelinePhase::Classify, format!("classifying: {}", request.query));
        let classification = classify(&request.query);
        trace.push(
            PipelinePhase::Classify,
            "classify query",
            &format!(
                "{:?} / {:?} / {:?}, verification={}",
                classification.query_type,
                classification.domain,
                classification.complexity,
                classification.requires_verification
            ),
        );
        if let Some(refusal) = self.deadline_refusal(&request_id, started, budget, &mut trace, PipelinePhase::Classify) {
            return Ok(refusal);
        }

        // --- fan_out_branches ---
        emit(
            PipelinePhase::FanOutBranches,
            format!("fetching evidence for {} keyword(s)", classification.keywords.len()),
        );
        let remaining = budget.saturating_sub(started.elapsed());
        let evidence = match tokio::time::timeout(
            remaining,
            self.branches.fan_out(&request.query, &classification),
        )
        .await
        {
            Ok(evidence) => evidence,
            Err(_) => {
                trace.push(PipelinePhase::FanOutBranches, "fan out branches", "deadline expired");
                return Ok(self.timeout_refusal(&request_id, started, trace));
            }
        };
        trace.push(
            PipelinePhase::FanOutBranches,
            "fan out branches",
            &format!(
                "{} branch(es) returned evidence: {}",
                evidence.len(),
                evidence.iter().map(|e| e.branch.as_str()).collect::<Vec<_>>().join(", ")
            ),
        );
        if let Some(refusal) = self.deadline_refusal(&request_id, started, budget, &mut trace, PipelinePhase::FanOutBranches) {
            return Ok(refusal);
        }

        // --- council_deliberate ---
        emit(PipelinePhase::CouncilDeliberate, "convening the council".to_string());
        let require_consensus = classification.requires_multiple_sources;
        let remaining = budget.saturating_sub(started.elapsed());
        let deliberation = match tokio::time::timeout(
            remaining,
            self.council.deliberate(
                &request_id,
                CouncilRequest::full_council(&request.query, require_consensus),
                None,
            ),
        )
        .await
        {
            Ok(deliberation) => deliberation,
            Err(_) => {
                trace.push(PipelinePhase::CouncilDeliberate, "deliberate", "deadline expired");
                return Ok(self.timeout_refusal(&request_id, started, trace));
            }
        };
        trace.push(
            PipelinePhase::CouncilDeliberate,
            "deliberate",
            &format!(
                "{} responses, {} challenges, verdict {}",
                deliberation.responses.len(),
                deliberation.challenges.len(),
                deliberation.verdict.kind.as_str()
            ),
        );
        emit(
            PipelinePhase::CouncilDeliberate,
            format!("verdict: {}", deliberation.verdict.kind.as_str()),
        );
        self.ledger.store().insert_deliberation(&deliberation)?;
        if let Some(refusal) = self.deadline_refusal(&request_id, started, budget, &mut trace, PipelinePhase::CouncilDeliberate) {
            return Ok(refusal);
        }

        // --- validate ---
        emit(PipelinePhase::Validate, "validating against anchored sources".to_string());
        let best = best_evidence(&evidence);
        let content = best
            .map(|e| e.content.clone())
            .unwrap_or_else(|| deliberation.final_proposal.clone());
        let sources = best.map(|e| e.sources.clone()).unwrap_or_default();

        let outcome = odin::validate(
            ValidationInput {
                request_id: &request_id,
                content: &content,
                require_mimir_anchor: request.options.require_mimir_anchor,
                sources: &sources,
                council_verdict: Some(deliberation.verdict.kind),
                branch_results: &evidence,
            },
            trace,
            started,
        );

        if !outcome.is_valid {
            let reason = outcome.refusal.unwrap_or(RefusalReason::Internal);
            emit(PipelinePhase::Validate, format!("refused: {}", reason.as_str()));
            let mut response = YggdrasilResponse::refusal(reason, want_trace.then_some(outcome.trace));
            response.deliberation_id = Some(deliberation.id.clone());
            return Ok(response);
        }

        // --- persist ---
        emit(PipelinePhase::Persist, "writing verified knowledge".to_string());
        let branch = best.map(|e| e.branch).unwrap_or(Branch::Hugin);
        let confidence = best.map(|e| e.confidence).unwrap_or(0);
        let mut final_trace = outcome.trace;

        let node_id = self.persist_answer(
            &content,
            branch,
            confidence,
            &classification,
            &sources,
            &deliberation,
        )?;
        final_trace.steps.push(TraceStep {
            step_number: final_trace.steps.len() as u32 + 1,
            phase: PipelinePhase::Persist,
            action: "persist verified node".to_string(),
            result: node_id.clone(),
            timestamp: chrono::Utc::now(),
        });
        final_trace.processing_time_ms = started.elapsed().as_millis() as u64;

        info!(request = %request_id, node = %node_id, branch = %branch, "query verified");
        let mut response = YggdrasilResponse::verified(
            content,
            sources,
            branch,
            want_trace.then_some(final_trace),
        );
        response.deliberation_id = Some(deliberation.id);
        Ok(response)
    }

    /// Create (and, when anchored, verify) the node for an approved answer,
    /// then fold in the deliberation's Shapley attribution.
    fn persist_answer(
        &self,
        content: &str,
        branch: Branch,
        confidence: u8,
        classification: &ygg_common::classifier::Classification,
        sources: &[ygg_common::source::Source],
        deliberation: &ygg_common::council::CouncilDeliberation,
    ) -> YggResult<String> {
        let statement = truncate_on_char_boundary(content, PERSIST_STATEMENT_BYTES);
        let node = self.ledger.create_node(
            statement,
            CreateNodeOpts {
                confidence,
                domain: Some(format!("{:?}", classification.domain)),
                tags: classification.keywords.clone(),
                branch: Some(branch),
                sources: sources.to_vec(),
                trigger: "pipeline".to_string(),
                agent: "odin".to_string(),
            },
        )?;

        // Anchored non-HUGIN knowledge is promoted immediately; HUGIN
        // intake stays WATCHING until the watcher earns it an upgrade.
        if branch != Branch::Hugin && sources.iter().any(|s| s.is_anchor()) {
            self.ledger.transition_state(
                &node.id,
                NodeState::Verified,
                TransitionOpts {
                    trigger: "pipeline".to_string(),
                    agent: "odin".to_string(),
                    reason: "validated with anchored sources".to_string(),
                    new_confidence: None,
                    vote_record: serde_json::to_value(&deliberation.verdict).ok(),
                },
            )?;
        }

        let report = shapley::attribute(
            &deliberation.responses,
            &deliberation.challenges,
            deliberation.verdict.kind,
        );
        let contributions = report
            .attributions
            .iter()
            .map(|a| (a.member.to_string(), a.percentage))
            .collect();
        self.ledger.update_shapley_attribution(&node.id, &contributions)?;

        Ok(node.id)
    }

    fn deadline_refusal(
        &self,
        request_id: &str,
        started: Instant,
        budget: Duration,
        trace: &mut TraceBuilder,
        phase: PipelinePhase,
    ) -> Option<YggdrasilResponse> {
        if started.elapsed() < budget {
            return None;
        }
        trace.push(phase, "deadline check", "expired");
        let trace = std::mem::take(trace);
        Some(self.timeout_refusal(request_id, started, trace))
    }

    fn timeout_refusal(&self, request_id: &str, started: Instant, trace: TraceBuilder) -> YggdrasilResponse {
        let trace = trace.into_trace(
            request_id,
            FinalDecision::Rejected,
            started.elapsed().as_millis() as u64,
        );
        // Timeout refusals always carry the partial trace.
        YggdrasilResponse::refusal(RefusalReason::Timeout, Some(trace))
    }
}

/// Highest-trust branch with evidence: MIMIR over VOLVA over HUGIN.
fn best_evidence(evidence: &[BranchEvidence]) -> Option<&BranchEvidence> {
    for branch in [Branch::Mimir, Branch::Volva, Branch::Hugin] {
        if let Some(found) = evidence.iter().find(|e| e.branch == branch) {
            return Some(found);
        }
    }
    None
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
