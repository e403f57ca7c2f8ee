//! The three epistemic branches and the confidence partition.
//!
//! Confidence is an integer 0-100 split into three disjoint cells:
//! `[0,49]` HUGIN (unverified), `[50,99]` VOLVA (probable), `{100}` MIMIR
//! (verified). No other mapping exists anywhere in the system; every write
//! path validates against this partition before touching the store.

use serde::{Deserialize, Serialize};

use crate::error::{YggError, YggResult};

/// Highest confidence a HUGIN entry may carry.
pub const HUGIN_CEILING: u8 = 49;
/// Highest confidence a VOLVA entry may carry.
pub const VOLVA_CEILING: u8 = 99;
/// The single MIMIR confidence value.
pub const MIMIR_CONFIDENCE: u8 = 100;

/// Epistemic branch of a knowledge node or evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Branch {
    /// Verified knowledge. Confidence is exactly 100.
    Mimir,
    /// Probable knowledge under observation. Confidence 50-99.
    Volva,
    /// Unverified intake. Confidence 0-49.
    Hugin,
}

impl Branch {
    /// The branch a confidence value belongs to.
    ///
    /// Values above 100 are clamped to MIMIR by the caller's validation;
    /// this function itself is total over u8.
    pub fn for_confidence(confidence: u8) -> Branch {
        match confidence {
            MIMIR_CONFIDENCE.. => Branch::Mimir,
            50..=VOLVA_CEILING => Branch::Volva,
            _ => Branch::Hugin,
        }
    }

    /// Whether `confidence` falls inside this branch's partition cell.
    pub fn contains(&self, confidence: u8) -> bool {
        Branch::for_confidence(confidence) == *self
    }

    /// Inclusive upper bound of this branch's confidence range.
    pub fn ceiling(&self) -> u8 {
        match self {
            Branch::Mimir => MIMIR_CONFIDENCE,
            Branch::Volva => VOLVA_CEILING,
            Branch::Hugin => HUGIN_CEILING,
        }
    }

    /// Inclusive lower bound of this branch's confidence range.
    pub fn floor(&self) -> u8 {
        match self {
            Branch::Mimir => MIMIR_CONFIDENCE,
            Branch::Volva => 50,
            Branch::Hugin => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Mimir => "MIMIR",
            Branch::Volva => "VOLVA",
            Branch::Hugin => "HUGIN",
        }
    }

    pub fn parse(s: &str) -> Option<Branch> {
        match s {
            "MIMIR" => Some(Branch::Mimir),
            "VOLVA" => Some(Branch::Volva),
            "HUGIN" => Some(Branch::Hugin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validate a `(branch, confidence)` pair against the partition.
///
/// Every create and transition goes through here; a mismatch is a
/// `BranchViolation` and the write fails.
pub fn check_partition(branch: Branch, confidence: u8) -> YggResult<()> {
    if confidence > 100 {
        return Err(YggError::BranchViolation { branch, confidence });
    }
    if !branch.contains(confidence) {
        return Err(YggError::BranchViolation { branch, confidence });
    }
    Ok(())
}
