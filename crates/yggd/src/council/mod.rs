//! Council deliberation runtime.
//!
//! Five phases: fan out to every requested member with a capable adapter,
//! collect until the phase deadline, let LOKI challenge the collected
//! responses, derive TYR's verdict from the vote buckets, and assemble the
//! final proposal. Responses are kept in canonical member order so the
//! same inputs always produce the same verdict and vote counts.

pub mod adapters;

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ygg_common::council::{
    derive_verdict, ChallengeSeverity, CouncilDeliberation, CouncilMember, CouncilMemberResponse,
    LokiChallenge, Verdict, VerdictKind, Vote, VoteCounts,
};
use ygg_common::YggError;

use adapters::AdapterRegistry;

/// Default bound on the fan-out/collect phase.
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(45);

/// One deliberation request.
#[derive(Debug, Clone)]
pub struct CouncilRequest {
    pub query: String,
    pub members: Vec<CouncilMember>,
    pub require_consensus: bool,
}

impl CouncilRequest {
    pub fn full_council(query: &str, require_consensus: bool) -> Self {
        let mut members: Vec<CouncilMember> = CouncilMember::deliberating().to_vec();
        members.push(CouncilMember::Loki);
        Self {
            query: query.to_string(),
            members,
            require_consensus,
        }
    }
}

/// The council runtime. Cheap to clone via the shared registry.
pub struct Council {
    registry: Arc<AdapterRegistry>,
    phase_timeout: Duration,
}

impl Council {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
        }
    }

    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Run a full deliberation.
    pub async fn deliberate(
        &self,
        request_id: &str,
        request: CouncilRequest,
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> CouncilDeliberation {
        let started = Instant::now();
        let emit = |msg: String| {
            if let Some(tx) = &progress {
                let _ = tx.send(msg);
            }
        };

        // Phase 1+2: fan out and collect.
        let responses = self.fan_out(&request).await;
        emit(format!("{} of {} members responded", responses.len(), request.members.len()));

        // Phase 3: adversarial challenge.
        let challenges = if request.members.contains(&CouncilMember::Loki) {
            self.challenge(&request.query, &responses).await
        } else {
            Vec::new()
        };
        if !challenges.is_empty() {
            emit(format!("LOKI raised {} challenge(s)", challenges.len()));
        }

        // Phase 4: arbitration.
        let verdict = arbitrate(&responses, request.require_consensus);
        emit(format!("verdict: {}", verdict.kind.as_str()));

        // Phase 5: proposal.
        let final_proposal = assemble_proposal(&responses, verdict.kind);

        let deliberation = CouncilDeliberation {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            query: request.query,
            responses,
            challenges,
            verdict,
            final_proposal,
            total_duration_ms: started.elapsed().as_millis() as u64,
            ts: Utc::now(),
        };
        info!(
            deliberation = %deliberation.id,
            verdict = deliberation.verdict.kind.as_str(),
            responses = deliberation.responses.len(),
            "deliberation complete"
        );
        deliberation
    }

    /// Launch every requested deliberating member concurrently and collect
    /// until all finish or the phase deadline expires. Unresponsive members
    /// contribute no response.
    async fn fan_out(&self, request: &CouncilRequest) -> Vec<CouncilMemberResponse> {
        let mut join_set: JoinSet<Option<CouncilMemberResponse>> = JoinSet::new();

        for member in request.members.iter().copied().filter(|m| m.is_deliberating()) {
            let Some(adapter) = self.registry.get(member) else {
                debug!(member = %member, "no adapter registered, skipping");
                continue;
            };
            let query = request.query.clone();
            join_set.spawn(async move {
                if !adapter.is_available().await {
                    debug!(member = %member, "adapter unavailable, skipping");
                    return None;
                }
                let started = Instant::now();
                match adapter.query(&query).await {
                    Ok(reply) => Some(CouncilMemberResponse {
                        member,
                        content: reply.content,
                        confidence: reply.confidence,
                        reasoning: reply.reasoning,
                        model: reply.model,
                        duration_ms: started.elapsed().as_millis() as u64,
                        ts: Utc::now(),
                    }),
                    Err(YggError::AdapterTimeout(ms)) => {
                        warn!(member = %member, ms, "adapter timed out");
                        None
                    }
                    Err(e) => {
                        warn!(member = %member, error = %e, "adapter failed");
                        None
                    }
                }
            });
        }

        let mut responses: Vec<CouncilMemberResponse> = Vec::new();
        let deadline = tokio::time::sleep(self.phase_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    Some(Ok(Some(response))) => responses.push(response),
                    Some(Ok(None)) => {}
                    Some(Err(e)) => warn!(error = %e, "member task panicked"),
                    None => break,
                },
                _ = &mut deadline => {
                    warn!("fan-out phase deadline reached, {} stragglers dropped", join_set.len());
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Stable ordering by member enum order keeps verdicts reproducible.
        responses.sort_by_key(|r| r.member);
        responses
    }

    /// Hand the collected responses to LOKI and parse its challenges.
    async fn challenge(
        &self,
        query: &str,
        responses: &[CouncilMemberResponse],
    ) -> Vec<LokiChallenge> {
        if responses.is_empty() {
            return Vec::new();
        }
        let Some(adapter) = self.registry.get(CouncilMember::Loki) else {
            return Vec::new();
        };
        if !adapter.is_available().await {
            return Vec::new();
        }

        let mut prompt = format!("Query under deliberation: {}\n\nResponses:\n", query);
        for response in responses {
            prompt.push_str(&format!(
                "[{}] (confidence {}): {}\n",
                response.member, response.confidence, response.content
            ));
        }

        match adapter.query(&prompt).await {
            Ok(reply) => parse_challenges(&reply.content),
            Err(e) => {
                warn!(error = %e, "LOKI unavailable, no challenges this round");
                Vec::new()
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct RawChallenge {
    target: String,
    text: String,
    severity: String,
}

/// Parse LOKI's JSON challenge array, tolerating prose around it.
fn parse_challenges(raw: &str) -> Vec<LokiChallenge> {
    let json = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => return Vec::new(),
    };
    let parsed: Vec<RawChallenge> = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable LOKI output dropped");
            return Vec::new();
        }
    };
    parsed
        .into_iter()
        .filter_map(|c| {
            let target = CouncilMember::parse(&c.target.to_uppercase())?;
            let severity =
                ChallengeSeverity::parse(&c.severity.to_uppercase()).unwrap_or(ChallengeSeverity::Low);
            Some(LokiChallenge {
                id: uuid::Uuid::new_v4().to_string(),
                target_member: target,
                text: c.text,
                severity,
                resolved: false,
                ts: Utc::now(),
            })
        })
        .collect()
}

/// TYR: bucket the votes and derive the verdict. Deterministic.
pub fn arbitrate(responses: &[CouncilMemberResponse], require_consensus: bool) -> Verdict {
    let mut counts = VoteCounts::default();
    for response in responses {
        match Vote::from_confidence(response.confidence) {
            Vote::Yes => counts.yes += 1,
            Vote::Partial => counts.partial += 1,
            Vote::No => counts.no += 1,
        }
    }

    let kind = derive_verdict(counts, require_consensus);
    let dissent: Vec<CouncilMember> = match kind {
        VerdictKind::Consensus | VerdictKind::Majority => responses
            .iter()
            .filter(|r| Vote::from_confidence(r.confidence) == Vote::No)
            .map(|r| r.member)
            .collect(),
        VerdictKind::Deadlock => responses
            .iter()
            .filter(|r| Vote::from_confidence(r.confidence) == Vote::Yes)
            .map(|r| r.member)
            .collect(),
        VerdictKind::Split => Vec::new(),
    };

    let reasoning = format!(
        "{} yes / {} partial / {} no of {} responses -> {}",
        counts.yes,
        counts.partial,
        counts.no,
        counts.total(),
        kind.as_str()
    );

    Verdict {
        kind,
        vote_counts: counts,
        reasoning,
        dissent,
    }
}

/// Concatenate the top-voted contents with their attributions.
fn assemble_proposal(responses: &[CouncilMemberResponse], kind: VerdictKind) -> String {
    if responses.is_empty() {
        return String::new();
    }
    let winning_vote = match kind {
        VerdictKind::Consensus | VerdictKind::Majority => Vote::Yes,
        VerdictKind::Split | VerdictKind::Deadlock => {
            // No winning side; propose from the most confident bucket.
            let best = responses.iter().map(|r| r.confidence).max().unwrap_or(0);
            Vote::from_confidence(best)
        }
    };
    responses
        .iter()
        .filter(|r| Vote::from_confidence(r.confidence) == winning_vote)
        .map(|r| format!("[{}] {}", r.member, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
