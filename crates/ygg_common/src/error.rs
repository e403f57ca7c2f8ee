//! Domain errors for the Yggdrasil core.
//!
//! These are epistemic errors, not transport errors. The HTTP layer maps
//! them to status codes; the pipeline maps the refusal-shaped ones to
//! `YggdrasilResponse` refusals instead of surfacing them to the caller.

use crate::branch::Branch;

/// Errors raised by the epistemic core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum YggError {
    /// Transition to VERIFIED attempted without an anchored source.
    #[error("verification unsupported for node {node_id}: {reason}")]
    VerificationUnsupported { node_id: String, reason: String },

    /// Confidence written outside the branch partition.
    #[error("branch violation: confidence {confidence} does not belong to {branch}")]
    BranchViolation { branch: Branch, confidence: u8 },

    /// Node or checkpoint id not present in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Adapter has no credentials or failed its availability probe. Non-fatal.
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// Adapter exceeded its per-call timeout. Non-fatal, counted as a non-response.
    #[error("adapter timed out after {0} ms")]
    AdapterTimeout(u64),

    /// Council could not reach a usable verdict.
    #[error("consensus not reached: {0}")]
    ConsensusNotReached(String),

    /// Pipeline deadline expired mid-flight.
    #[error("deadline exceeded in phase {0}")]
    DeadlineExceeded(String),

    /// The backing store failed. Fatal, propagated.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Malformed input at a core boundary (empty statement, bad strength, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type YggResult<T> = Result<T, YggError>;
