//! Shapley attribution of council contribution.
//!
//! Computes the fair share of a deliberation's value for each responding
//! member. Member sets are small (at most eight), so the exact powerset
//! formulation is used rather than sampling.

use serde::{Deserialize, Serialize};

use crate::council::{
    ChallengeSeverity, CouncilMember, CouncilMemberResponse, LokiChallenge, VerdictKind,
};

/// Verdict factor applied to coalition alignment.
fn verdict_factor(kind: VerdictKind) -> f64 {
    match kind {
        VerdictKind::Consensus => 1.0,
        VerdictKind::Majority => 0.8,
        VerdictKind::Split => 0.5,
        VerdictKind::Deadlock => 0.3,
    }
}

/// Per-member attribution for one deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAttribution {
    pub member: CouncilMember,
    /// Raw Shapley value.
    pub shapley_value: f64,
    /// Share of the total, normalized to 100.
    pub percentage: f64,
    /// `min(100, confidence + reasoning bonus)`.
    pub response_quality: f64,
    /// 100 minus challenge penalties for answerers; challenge yield for LOKI.
    pub challenge_impact: f64,
    /// Response confidence weighted by the verdict factor.
    pub consensus_alignment: f64,
}

/// Attribution report for a full deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapleyReport {
    pub attributions: Vec<MemberAttribution>,
    /// Value of the grand coalition, `v(N)`.
    pub coalition_value: f64,
}

/// Coalition value over a confidence subset.
///
/// `v(S) = 0.3 * avg + 0.3 * agreement + 0.4 * alignment`, `v(empty) = 0`.
fn coalition_value(confidences: &[f64], verdict: VerdictKind) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let avg = confidences.iter().sum::<f64>() / confidences.len() as f64;
    let agreement = if confidences.len() == 1 {
        100.0
    } else {
        let variance = confidences.iter().map(|c| (c - avg).powi(2)).sum::<f64>()
            / confidences.len() as f64;
        (100.0 - variance.sqrt()).max(0.0)
    };
    let alignment = avg * verdict_factor(verdict);
    0.3 * avg + 0.3 * agreement + 0.4 * alignment
}

/// Compute the full attribution report for a deliberation.
///
/// Responses beyond eight members are truncated in canonical member order
/// before the powerset walk; in practice the council never exceeds seven.
pub fn attribute(
    responses: &[CouncilMemberResponse],
    challenges: &[LokiChallenge],
    verdict: VerdictKind,
) -> ShapleyReport {
    let mut ordered: Vec<&CouncilMemberResponse> = responses.iter().collect();
    ordered.sort_by_key(|r| r.member);
    ordered.truncate(8);

    let n = ordered.len();
    let confidences: Vec<f64> = ordered.iter().map(|r| r.confidence as f64).collect();
    let grand = coalition_value(&confidences, verdict);

    if n == 0 {
        return ShapleyReport {
            attributions: Vec::new(),
            coalition_value: 0.0,
        };
    }

    // factorials up to 8
    let mut fact = [1f64; 9];
    for i in 1..=8 {
        fact[i] = fact[i - 1] * i as f64;
    }

    let subset_confidences = |mask: usize| -> Vec<f64> {
        (0..n).filter(|i| mask & (1 << i) != 0).map(|i| confidences[i]).collect()
    };

    let mut phi = vec![0f64; n];
    for (i, phi_i) in phi.iter_mut().enumerate() {
        let others: Vec<usize> = (0..n).filter(|j| *j != i).collect();
        for mask_bits in 0..(1usize << others.len()) {
            let mut mask = 0usize;
            for (b, j) in others.iter().enumerate() {
                if mask_bits & (1 << b) != 0 {
                    mask |= 1 << j;
                }
            }
            let s = mask.count_ones() as usize;
            let weight = fact[s] * fact[n - s - 1] / fact[n];
            let without = coalition_value(&subset_confidences(mask), verdict);
            let with = coalition_value(&subset_confidences(mask | (1 << i)), verdict);
            *phi_i += weight * (with - without);
        }
    }

    let total: f64 = phi.iter().sum();
    let attributions = ordered
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let percentage = if total.abs() < f64::EPSILON {
                100.0 / n as f64
            } else {
                phi[i] / total * 100.0
            };
            MemberAttribution {
                member: r.member,
                shapley_value: phi[i],
                percentage,
                response_quality: response_quality(r),
                challenge_impact: challenge_impact(r.member, challenges),
                consensus_alignment: r.confidence as f64 * verdict_factor(verdict),
            }
        })
        .collect();

    ShapleyReport {
        attributions,
        coalition_value: grand,
    }
}

/// Confidence plus a bonus for substantive reasoning.
pub fn response_quality(response: &CouncilMemberResponse) -> f64 {
    let bonus = match &response.reasoning {
        Some(r) if r.len() > 100 => 10.0,
        _ => 0.0,
    };
    (response.confidence as f64 + bonus).min(100.0)
}

/// Challenge impact.
///
/// Answerers lose per challenge against them (CRITICAL 40, HIGH 25,
/// MEDIUM 15, LOW 5), floored at zero. LOKI gains for substantive
/// challenges: `min(100, 50 + 20 * high_or_critical)`, 50 when idle.
pub fn challenge_impact(member: CouncilMember, challenges: &[LokiChallenge]) -> f64 {
    if member == CouncilMember::Loki {
        if challenges.is_empty() {
            return 50.0;
        }
        let serious = challenges
            .iter()
            .filter(|c| c.severity >= ChallengeSeverity::High)
            .count() as f64;
        return (50.0 + 20.0 * serious).min(100.0);
    }
    let penalty: f64 = challenges
        .iter()
        .filter(|c| c.target_member == member)
        .map(|c| match c.severity {
            ChallengeSeverity::Critical => 40.0,
            ChallengeSeverity::High => 25.0,
            ChallengeSeverity::Medium => 15.0,
            ChallengeSeverity::Low => 5.0,
        })
        .sum();
    (100.0 - penalty).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn response(member: CouncilMember, confidence: u8) -> CouncilMemberResponse {
        CouncilMemberResponse {
            member,
            content: format!("{} answer", member),
            confidence,
            reasoning: None,
            model: None,
            duration_ms: 10,
            ts: Utc::now(),
        }
    }

    fn challenge(target: CouncilMember, severity: ChallengeSeverity) -> LokiChallenge {
        LokiChallenge {
            id: "c1".to_string(),
            target_member: target,
            text: "weak claim".to_string(),
            severity,
            resolved: false,
            ts: Utc::now(),
        }
    }

    #[test]
    fn efficiency_sum_equals_grand_coalition() {
        let responses = vec![
            response(CouncilMember::Kvasir, 95),
            response(CouncilMember::Bragi, 92),
            response(CouncilMember::Nornes, 88),
        ];
        let report = attribute(&responses, &[], VerdictKind::Consensus);
        let sum: f64 = report.attributions.iter().map(|a| a.shapley_value).sum();
        assert!((sum - report.coalition_value).abs() < 1e-9);

        let pct: f64 = report.attributions.iter().map(|a| a.percentage).sum();
        assert!((pct - 100.0).abs() < 0.5);
    }

    #[test]
    fn singleton_gets_its_own_value() {
        let responses = vec![response(CouncilMember::Saga, 80)];
        let report = attribute(&responses, &[], VerdictKind::Majority);
        assert_eq!(report.attributions.len(), 1);
        let expected = coalition_value(&[80.0], VerdictKind::Majority);
        assert!((report.attributions[0].shapley_value - expected).abs() < 1e-9);
        assert!((report.attributions[0].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_council_yields_empty_report() {
        let report = attribute(&[], &[], VerdictKind::Deadlock);
        assert!(report.attributions.is_empty());
        assert_eq!(report.coalition_value, 0.0);
    }

    #[test]
    fn agreement_rewards_tight_coalitions() {
        let tight = coalition_value(&[90.0, 91.0, 89.0], VerdictKind::Consensus);
        let loose = coalition_value(&[90.0, 30.0, 60.0], VerdictKind::Consensus);
        assert!(tight > loose);
    }

    #[test]
    fn response_quality_bonus_for_reasoning() {
        let mut r = response(CouncilMember::Syn, 85);
        assert_eq!(response_quality(&r), 85.0);
        r.reasoning = Some("x".repeat(150));
        assert_eq!(response_quality(&r), 95.0);
        r.confidence = 98;
        assert_eq!(response_quality(&r), 100.0);
    }

    #[test]
    fn challenge_penalties_and_loki_yield() {
        let challenges = vec![
            challenge(CouncilMember::Bragi, ChallengeSeverity::Critical),
            challenge(CouncilMember::Bragi, ChallengeSeverity::High),
            challenge(CouncilMember::Saga, ChallengeSeverity::Low),
        ];
        assert_eq!(challenge_impact(CouncilMember::Bragi, &challenges), 35.0);
        assert_eq!(challenge_impact(CouncilMember::Saga, &challenges), 95.0);
        assert_eq!(challenge_impact(CouncilMember::Kvasir, &challenges), 100.0);
        // Two serious challenges: 50 + 40.
        assert_eq!(challenge_impact(CouncilMember::Loki, &challenges), 90.0);
        assert_eq!(challenge_impact(CouncilMember::Loki, &[]), 50.0);
    }

    #[test]
    fn symmetric_members_split_evenly() {
        let responses = vec![
            response(CouncilMember::Kvasir, 0),
            response(CouncilMember::Bragi, 0),
        ];
        let report = attribute(&responses, &[], VerdictKind::Deadlock);
        for a in &report.attributions {
            assert!((a.percentage - 50.0).abs() < 0.5);
        }
    }
}
