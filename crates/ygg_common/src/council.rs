//! Council deliberation types.
//!
//! Seven named roles, each backed by one model adapter. KVASIR, BRAGI,
//! NORNES, SAGA and SYN deliberate; LOKI challenges the collected
//! responses; TYR derives the verdict deterministically from the vote
//! buckets (identical inputs always yield the identical verdict).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Council roles, in canonical order. Response ordering in a deliberation
/// is stable by this order so verdicts are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouncilMember {
    Kvasir,
    Bragi,
    Nornes,
    Saga,
    Syn,
    Loki,
    Tyr,
}

impl CouncilMember {
    /// The five members that answer queries directly.
    pub fn deliberating() -> &'static [CouncilMember] {
        &[
            CouncilMember::Kvasir,
            CouncilMember::Bragi,
            CouncilMember::Nornes,
            CouncilMember::Saga,
            CouncilMember::Syn,
        ]
    }

    /// Whether this member produces an answer in the fan-out phase.
    pub fn is_deliberating(&self) -> bool {
        !matches!(self, CouncilMember::Loki | CouncilMember::Tyr)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CouncilMember::Kvasir => "KVASIR",
            CouncilMember::Bragi => "BRAGI",
            CouncilMember::Nornes => "NORNES",
            CouncilMember::Saga => "SAGA",
            CouncilMember::Syn => "SYN",
            CouncilMember::Loki => "LOKI",
            CouncilMember::Tyr => "TYR",
        }
    }

    pub fn parse(s: &str) -> Option<CouncilMember> {
        match s {
            "KVASIR" => Some(CouncilMember::Kvasir),
            "BRAGI" => Some(CouncilMember::Bragi),
            "NORNES" => Some(CouncilMember::Nornes),
            "SAGA" => Some(CouncilMember::Saga),
            "SYN" => Some(CouncilMember::Syn),
            "LOKI" => Some(CouncilMember::Loki),
            "TYR" => Some(CouncilMember::Tyr),
            _ => None,
        }
    }

    /// Compiled-in system prompt for the member's adapter. Members are held
    /// to direct, language-matched, technical output; confidence must be
    /// self-reported so the arbiter can bucket the vote.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            CouncilMember::Kvasir => {
                "You are KVASIR, the synthesist of a verification council. Answer the query \
                 directly and technically, in the language of the query. State only what you \
                 can support. End with a line 'CONFIDENCE: <0-100>' reflecting how certain \
                 you are, and a line 'REASONING: <one paragraph>'."
            }
            CouncilMember::Bragi => {
                "You are BRAGI, the articulator of a verification council. Give a precise, \
                 well-structured answer in the language of the query. No speculation, no \
                 filler. End with 'CONFIDENCE: <0-100>' and 'REASONING: <one paragraph>'."
            }
            CouncilMember::Nornes => {
                "You are NORNES, the council's analyst of causes and consequences. Answer \
                 with attention to conditions and time-dependence, in the language of the \
                 query. End with 'CONFIDENCE: <0-100>' and 'REASONING: <one paragraph>'."
            }
            CouncilMember::Saga => {
                "You are SAGA, the council's historian. Answer from established, documented \
                 knowledge in the language of the query; say plainly when the record is \
                 silent. End with 'CONFIDENCE: <0-100>' and 'REASONING: <one paragraph>'."
            }
            CouncilMember::Syn => {
                "You are SYN, the council's gatekeeper. Answer narrowly and refuse any part \
                 of the query that cannot be answered factually, in the language of the \
                 query. End with 'CONFIDENCE: <0-100>' and 'REASONING: <one paragraph>'."
            }
            CouncilMember::Loki => {
                "You are LOKI, the council's adversary. You receive the numbered responses \
                 of other members. Attack weak claims: find contradictions, unsupported \
                 leaps, and missing caveats. Reply ONLY with a JSON array of challenges: \
                 [{\"target\": \"<MEMBER>\", \"text\": \"<challenge>\", \"severity\": \
                 \"LOW|MEDIUM|HIGH|CRITICAL\"}]. Reply [] if nothing merits a challenge."
            }
            CouncilMember::Tyr => {
                "You are TYR, the arbiter. You never answer queries; verdicts are derived \
                 from the vote record."
            }
        }
    }
}

impl std::fmt::Display for CouncilMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a member's adapter returns for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilMemberResponse {
    pub member: CouncilMember,
    pub content: String,
    /// Self-reported confidence 0-100.
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub duration_ms: u64,
    pub ts: DateTime<Utc>,
}

/// Severity of a LOKI challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ChallengeSeverity {
    pub fn parse(s: &str) -> Option<ChallengeSeverity> {
        match s {
            "LOW" => Some(ChallengeSeverity::Low),
            "MEDIUM" => Some(ChallengeSeverity::Medium),
            "HIGH" => Some(ChallengeSeverity::High),
            "CRITICAL" => Some(ChallengeSeverity::Critical),
            _ => None,
        }
    }
}

/// An adversarial challenge emitted by LOKI against one member's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LokiChallenge {
    pub id: String,
    pub target_member: CouncilMember,
    pub text: String,
    pub severity: ChallengeSeverity,
    pub resolved: bool,
    pub ts: DateTime<Utc>,
}

/// Vote bucket derived from a response's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Yes,
    Partial,
    No,
}

impl Vote {
    /// `>= 70` yes, `[50,69]` partial, `< 50` no.
    pub fn from_confidence(confidence: u8) -> Vote {
        match confidence {
            70.. => Vote::Yes,
            50..=69 => Vote::Partial,
            _ => Vote::No,
        }
    }
}

/// Multiset of votes across the collected responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub yes: usize,
    pub partial: usize,
    pub no: usize,
}

impl VoteCounts {
    pub fn total(&self) -> usize {
        self.yes + self.partial + self.no
    }
}

/// Verdict classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    Consensus,
    Majority,
    Split,
    Deadlock,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Consensus => "CONSENSUS",
            VerdictKind::Majority => "MAJORITY",
            VerdictKind::Split => "SPLIT",
            VerdictKind::Deadlock => "DEADLOCK",
        }
    }
}

/// TYR's arbitration result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub kind: VerdictKind,
    pub vote_counts: VoteCounts,
    pub reasoning: String,
    /// Members whose vote went against the verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dissent: Vec<CouncilMember>,
}

/// A full council deliberation record, persisted as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilDeliberation {
    pub id: String,
    pub request_id: String,
    pub query: String,
    pub responses: Vec<CouncilMemberResponse>,
    pub challenges: Vec<LokiChallenge>,
    pub verdict: Verdict,
    pub final_proposal: String,
    pub total_duration_ms: u64,
    pub ts: DateTime<Utc>,
}

/// Derive the verdict from the vote buckets.
///
/// CONSENSUS needs zero no-votes and a yes super-majority (`yes >=
/// ceil(N/2)+1`). A yes plurality is MAJORITY. When consensus was required
/// and yes does not outnumber no, the council is deadlocked; otherwise an
/// exact tie is SPLIT and a no plurality is DEADLOCK. An empty council is
/// always DEADLOCK.
pub fn derive_verdict(counts: VoteCounts, require_consensus: bool) -> VerdictKind {
    let n = counts.total();
    if n == 0 {
        return VerdictKind::Deadlock;
    }
    let supermajority = n.div_ceil(2) + 1;
    if counts.no == 0 && counts.yes >= supermajority {
        return VerdictKind::Consensus;
    }
    if counts.yes > counts.no {
        return VerdictKind::Majority;
    }
    if require_consensus {
        return VerdictKind::Deadlock;
    }
    if counts.yes == counts.no {
        VerdictKind::Split
    } else {
        VerdictKind::Deadlock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(yes: usize, partial: usize, no: usize) -> VoteCounts {
        VoteCounts { yes, partial, no }
    }

    #[test]
    fn vote_buckets() {
        assert_eq!(Vote::from_confidence(70), Vote::Yes);
        assert_eq!(Vote::from_confidence(69), Vote::Partial);
        assert_eq!(Vote::from_confidence(50), Vote::Partial);
        assert_eq!(Vote::from_confidence(49), Vote::No);
        assert_eq!(Vote::from_confidence(100), Vote::Yes);
    }

    #[test]
    fn consensus_needs_no_dissent_and_supermajority() {
        // Three members, all yes: ceil(3/2)+1 = 3.
        assert_eq!(derive_verdict(counts(3, 0, 0), false), VerdictKind::Consensus);
        // One partial breaks the supermajority but not the majority.
        assert_eq!(derive_verdict(counts(2, 1, 0), false), VerdictKind::Majority);
        // A single no-vote rules consensus out entirely.
        assert_eq!(derive_verdict(counts(4, 0, 1), false), VerdictKind::Majority);
    }

    #[test]
    fn tie_is_split_unless_consensus_required() {
        assert_eq!(derive_verdict(counts(2, 0, 2), false), VerdictKind::Split);
        assert_eq!(derive_verdict(counts(2, 0, 2), true), VerdictKind::Deadlock);
    }

    #[test]
    fn no_plurality_is_deadlock() {
        assert_eq!(derive_verdict(counts(1, 0, 2), true), VerdictKind::Deadlock);
        assert_eq!(derive_verdict(counts(1, 0, 2), false), VerdictKind::Deadlock);
    }

    #[test]
    fn empty_council_deadlocks() {
        assert_eq!(derive_verdict(counts(0, 0, 0), false), VerdictKind::Deadlock);
        assert_eq!(derive_verdict(counts(0, 0, 0), true), VerdictKind::Deadlock);
    }

    #[test]
    fn all_partial_is_split() {
        // yes == no == 0 with responses present: an exact tie.
        assert_eq!(derive_verdict(counts(0, 3, 0), false), VerdictKind::Split);
    }

    #[test]
    fn member_order_is_canonical() {
        let mut members = vec![CouncilMember::Syn, CouncilMember::Kvasir, CouncilMember::Bragi];
        members.sort();
        assert_eq!(
            members,
            vec![CouncilMember::Kvasir, CouncilMember::Bragi, CouncilMember::Syn]
        );
    }
}
