//! The validator.
//!
//! Odin never adjusts content. Given the assembled evidence, the council
//! verdict, and the branch results, it either approves (confidence 100,
//! sources attached, trace synthesized) or refuses with a named reason.

use std::time::Instant;

use tracing::info;

use ygg_common::api::RefusalReason;
use ygg_common::council::VerdictKind;
use ygg_common::source::Source;
use ygg_common::trace::{FinalDecision, PipelinePhase, TraceBuilder, ValidationTrace};

use crate::branches::BranchEvidence;

/// Everything Odin needs for one decision.
pub struct ValidationInput<'a> {
    pub request_id: &'a str,
    pub content: &'a str,
    pub require_mimir_anchor: bool,
    pub sources: &'a [Source],
    pub council_verdict: Option<VerdictKind>,
    pub branch_results: &'a [BranchEvidence],
}

/// Accept or refuse; never anything in between.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub refusal: Option<RefusalReason>,
    pub trace: ValidationTrace,
}

/// Run the validation ladder and synthesize the trace.
///
/// `trace` carries the steps the pipeline already recorded; Odin appends
/// its own checks and stamps the final decision.
pub fn validate(input: ValidationInput<'_>, mut trace: TraceBuilder, started: Instant) -> ValidationOutcome {
    // 1. Anchor check.
    let anchored = input.sources.iter().filter(|s| s.is_anchor()).count();
    if input.require_mimir_anchor && anchored == 0 {
        trace.push(
            PipelinePhase::Validate,
            "anchor check",
            "no source with trust >= 80",
        );
        return reject(input.request_id, RefusalReason::NoSource, trace, started);
    }
    trace.push(
        PipelinePhase::Validate,
        "anchor check",
        &format!("{} anchored source(s)", anchored),
    );

    // 2. Verdict check.
    match input.council_verdict {
        Some(VerdictKind::Consensus) | Some(VerdictKind::Majority) => {
            trace.push(
                PipelinePhase::Validate,
                "verdict check",
                input.council_verdict.map(|v| v.as_str()).unwrap_or("none"),
            );
        }
        Some(VerdictKind::Deadlock) | Some(VerdictKind::Split) | None => {
            trace.push(
                PipelinePhase::Validate,
                "verdict check",
                input
                    .council_verdict
                    .map(|v| v.as_str())
                    .unwrap_or("no deliberation"),
            );
            return reject(input.request_id, RefusalReason::NoConsensus, trace, started);
        }
    }

    // 3. Branch ceiling check.
    for evidence in input.branch_results {
        if evidence.confidence > evidence.branch.ceiling() {
            trace.push(
                PipelinePhase::Validate,
                "branch ceiling check",
                &format!(
                    "{} evidence at {} exceeds ceiling {}",
                    evidence.branch,
                    evidence.confidence,
                    evidence.branch.ceiling()
                ),
            );
            return reject(input.request_id, RefusalReason::BranchViolation, trace, started);
        }
    }
    trace.push(PipelinePhase::Validate, "branch ceiling check", "all within ceilings");

    // 4. Approve. Content passes through untouched.
    trace.push(
        PipelinePhase::Validate,
        "approve",
        &format!("{} chars, {} source(s)", input.content.len(), input.sources.len()),
    );
    let trace = trace.into_trace(
        input.request_id,
        FinalDecision::Approved,
        started.elapsed().as_millis() as u64,
    );
    info!(request = %input.request_id, "validation approved");
    ValidationOutcome {
        is_valid: true,
        refusal: None,
        trace,
    }
}

fn reject(
    request_id: &str,
    reason: RefusalReason,
    trace: TraceBuilder,
    started: Instant,
) -> ValidationOutcome {
    let trace = trace.into_trace(
        request_id,
        FinalDecision::Rejected,
        started.elapsed().as_millis() as u64,
    );
    info!(request = %request_id, reason = reason.as_str(), "validation rejected");
    ValidationOutcome {
        is_valid: false,
        refusal: Some(reason),
        trace,
    }
}
