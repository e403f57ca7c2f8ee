//! Validation traces and thinking steps.
//!
//! The trace is the ordered record of pipeline steps that justifies an
//! accept or a refuse decision. It is part of the response contract, so
//! serialization must round-trip exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version stamp of the validator that produced a trace.
pub const ODIN_VERSION: &str = "2.3.0";

/// Named pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Classify,
    FanOutBranches,
    CouncilDeliberate,
    Validate,
    Persist,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Classify => "classify",
            PipelinePhase::FanOutBranches => "fan_out_branches",
            PipelinePhase::CouncilDeliberate => "council_deliberate",
            PipelinePhase::Validate => "validate",
            PipelinePhase::Persist => "persist",
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step in a validation trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub step_number: u32,
    pub phase: PipelinePhase,
    pub action: String,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

/// Final decision of the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalDecision {
    Approved,
    Rejected,
}

/// The full validation trace attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationTrace {
    pub request_id: String,
    pub odin_version: String,
    pub steps: Vec<TraceStep>,
    pub final_decision: FinalDecision,
    pub processing_time_ms: u64,
}

impl ValidationTrace {
    pub fn new(request_id: &str, final_decision: FinalDecision) -> Self {
        Self {
            request_id: request_id.to_string(),
            odin_version: ODIN_VERSION.to_string(),
            steps: Vec::new(),
            final_decision,
            processing_time_ms: 0,
        }
    }
}

/// A running trace builder used by the pipeline while phases execute.
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    steps: Vec<TraceStep>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one step; numbering is 1-based and derived from position.
    pub fn push(&mut self, phase: PipelinePhase, action: &str, result: &str) {
        let step_number = self.steps.len() as u32 + 1;
        self.steps.push(TraceStep {
            step_number,
            phase,
            action: action.to_string(),
            result: result.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn into_trace(
        self,
        request_id: &str,
        final_decision: FinalDecision,
        processing_time_ms: u64,
    ) -> ValidationTrace {
        ValidationTrace {
            request_id: request_id.to_string(),
            odin_version: ODIN_VERSION.to_string(),
            steps: self.steps,
            final_decision,
            processing_time_ms,
        }
    }
}

/// A thinking step emitted while the pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStep {
    pub phase: PipelinePhase,
    pub thought: String,
    pub ts: DateTime<Utc>,
}

impl ThinkingStep {
    pub fn new(phase: PipelinePhase, thought: impl Into<String>) -> Self {
        Self {
            phase,
            thought: thought.into(),
            ts: Utc::now(),
        }
    }
}
