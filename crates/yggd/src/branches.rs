//! Branch handlers: MIMIR, VOLVA, and HUGIN evidence fetchers.
//!
//! Each handler returns evidence for its own branch or nothing; the three
//! run concurrently and their outputs are joined. Cross-branch
//! contamination is prevented structurally: no handler can write outside
//! its branch, and HUGIN output is capped below the VOLVA floor.

use std::sync::Arc;
use tracing::{debug, warn};

use ygg_common::branch::Branch;
use ygg_common::classifier::Classification;
use ygg_common::disinfo::{self, ContentMetadata, Recommendation};
use ygg_common::node::NodeState;
use ygg_common::source::{Source, SourceType};
use ygg_common::YggResult;

use crate::ledger::Ledger;
use crate::search::{UnverifiedSearch, WebSnippet};

/// Most nodes or snippets a single handler will consider.
const EVIDENCE_LIMIT: usize = 8;

/// Evidence from one branch.
#[derive(Debug, Clone)]
pub struct BranchEvidence {
    pub branch: Branch,
    pub content: String,
    pub confidence: u8,
    pub sources: Vec<Source>,
}

/// The three branch handlers over a shared ledger and search collaborator.
pub struct BranchHandlers {
    ledger: Arc<Ledger>,
    search: Arc<dyn UnverifiedSearch>,
}

impl BranchHandlers {
    pub fn new(ledger: Arc<Ledger>, search: Arc<dyn UnverifiedSearch>) -> Self {
        Self { ledger, search }
    }

    /// Run all three handlers concurrently and join their evidence.
    /// A failing handler contributes nothing; it never aborts the others.
    pub async fn fan_out(&self, query: &str, classification: &Classification) -> Vec<BranchEvidence> {
        let keywords = &classification.keywords;
        let (mimir, volva, hugin) = tokio::join!(
            self.mimir(keywords),
            self.volva(keywords),
            self.hugin(query),
        );

        let mut evidence = Vec::new();
        for (branch, result) in [
            (Branch::Mimir, mimir),
            (Branch::Volva, volva),
            (Branch::Hugin, hugin),
        ] {
            match result {
                Ok(Some(found)) => evidence.push(found),
                Ok(None) => debug!(branch = %branch, "no evidence"),
                Err(e) => warn!(branch = %branch, error = %e, "handler failed, treated as empty"),
            }
        }
        evidence
    }

    /// MIMIR: verified nodes anchored by a trust-100 validated provider.
    async fn mimir(&self, keywords: &[String]) -> YggResult<Option<BranchEvidence>> {
        let nodes = self.ledger.store().find_nodes_by_keywords(
            keywords,
            Branch::Mimir,
            Some(NodeState::Verified),
            EVIDENCE_LIMIT,
        )?;

        let mut statements = Vec::new();
        let mut sources = Vec::new();
        for node in &nodes {
            let node_sources = self.ledger.sources_for(&node.id)?;
            // Only entries with a validated-provider source at full trust
            // are admissible here.
            if node_sources.iter().any(|s| s.is_mimir_grade()) {
                statements.push(node.statement.clone());
                sources.extend(node_sources);
            }
        }
        if statements.is_empty() {
            return Ok(None);
        }
        Ok(Some(BranchEvidence {
            branch: Branch::Mimir,
            content: statements.join(" "),
            confidence: 100,
            sources,
        }))
    }

    /// VOLVA: probable nodes (50-99) carrying at least one source.
    async fn volva(&self, keywords: &[String]) -> YggResult<Option<BranchEvidence>> {
        let nodes = self.ledger.store().find_nodes_by_keywords(
            keywords,
            Branch::Volva,
            None,
            EVIDENCE_LIMIT,
        )?;

        let mut statements = Vec::new();
        let mut sources = Vec::new();
        let mut confidence = 0u8;
        for node in &nodes {
            let node_sources = self.ledger.sources_for(&node.id)?;
            if node_sources.is_empty() {
                continue;
            }
            statements.push(node.statement.clone());
            confidence = confidence.max(node.confidence);
            sources.extend(node_sources);
        }
        if statements.is_empty() {
            return Ok(None);
        }
        Ok(Some(BranchEvidence {
            branch: Branch::Volva,
            content: statements.join(" "),
            confidence: confidence.clamp(Branch::Volva.floor(), Branch::Volva.ceiling()),
            sources,
        }))
    }

    /// HUGIN: web snippets through the disinformation filter, confidence
    /// capped below the VOLVA floor.
    async fn hugin(&self, query: &str) -> YggResult<Option<BranchEvidence>> {
        let snippets = self.search.search(query, EVIDENCE_LIMIT).await?;
        if snippets.is_empty() {
            return Ok(None);
        }

        let mut kept: Vec<(WebSnippet, u8)> = Vec::new();
        for snippet in snippets {
            let metadata = ContentMetadata {
                published_at: snippet.published_at,
                author: None,
            };
            let analysis = disinfo::analyze(&snippet.url, &snippet.snippet, Some(&metadata));
            match analysis.recommendation {
                Recommendation::Accept | Recommendation::Review => {
                    kept.push((snippet, analysis.risk_score));
                }
                Recommendation::Flag | Recommendation::Block => {
                    debug!(url = %snippet.url, risk = analysis.risk_score, "snippet dropped");
                }
            }
        }
        if kept.is_empty() {
            return Ok(None);
        }

        let avg_trust: u32 =
            kept.iter().map(|(_, risk)| 100 - *risk as u32).sum::<u32>() / kept.len() as u32;
        let confidence = (avg_trust * Branch::Hugin.ceiling() as u32 / 100) as u8;

        let content = kept
            .iter()
            .map(|(s, _)| s.snippet.clone())
            .collect::<Vec<_>>()
            .join(" ");
        let sources = kept
            .iter()
            .map(|(s, risk)| {
                // Web trust stays below the anchor threshold; unverified
                // snippets can never anchor a VERIFIED transition.
                let trust = ((100 - *risk as u32) * 3 / 4) as u8;
                Source::new(SourceType::Web, &disinfo::normalize_hostname(&s.url), &s.url, &s.title, trust)
            })
            .collect();

        Ok(Some(BranchEvidence {
            branch: Branch::Hugin,
            content,
            confidence: confidence.min(Branch::Hugin.ceiling()),
            sources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CreateNodeOpts;
    use crate::search::{FakeSearch, NoopSearch};
    use ygg_common::classifier::classify;
    use ygg_common::node::NodeState;

    fn arxiv_source() -> Source {
        Source::new(
            SourceType::Arxiv,
            "1905.11922",
            "https://arxiv.org/abs/1905.11922",
            "The speed of light",
            100,
        )
    }

    fn ledger_with_verified_fact() -> Arc<Ledger> {
        let ledger = Ledger::open_in_memory().unwrap();
        let node = ledger
            .create_node(
                "The speed of light in vacuum is 299,792,458 m/s",
                CreateNodeOpts {
                    confidence: 100,
                    sources: vec![arxiv_source()],
                    ..Default::default()
                },
            )
            .unwrap();
        ledger
            .transition_state(
                &node.id,
                NodeState::Verified,
                crate::ledger::TransitionOpts {
                    trigger: "test".to_string(),
                    agent: "test".to_string(),
                    reason: "seeded".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        Arc::new(ledger)
    }

    #[tokio::test]
    async fn mimir_returns_anchored_fact() {
        let handlers = BranchHandlers::new(ledger_with_verified_fact(), Arc::new(NoopSearch));
        let classification = classify("What is the speed of light in vacuum?");
        let evidence = handlers.fan_out("What is the speed of light in vacuum?", &classification).await;

        let mimir = evidence.iter().find(|e| e.branch == Branch::Mimir).unwrap();
        assert_eq!(mimir.confidence, 100);
        assert!(mimir.content.contains("299,792,458"));
        assert!(mimir.sources.iter().any(|s| s.is_mimir_grade()));
    }

    #[tokio::test]
    async fn hugin_caps_confidence_and_filters() {
        let search = FakeSearch::with_results(vec![
            WebSnippet {
                url: "https://example.com/article".to_string(),
                title: "A claim".to_string(),
                snippet: "Some plausible unverified statement.".to_string(),
                published_at: None,
            },
            WebSnippet {
                url: "https://infowars.com/post".to_string(),
                title: "Blocked".to_string(),
                snippet: "Fabricated nonsense.".to_string(),
                published_at: None,
            },
        ]);
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let handlers = BranchHandlers::new(ledger, Arc::new(search));
        let classification = classify("Is this claim true?");
        let evidence = handlers.fan_out("Is this claim true?", &classification).await;

        let hugin = evidence.iter().find(|e| e.branch == Branch::Hugin).unwrap();
        assert!(hugin.confidence <= 49);
        // The known-disinfo snippet was dropped.
        assert_eq!(hugin.sources.len(), 1);
        assert!(hugin.sources[0].trust_score < 80);
    }

    #[tokio::test]
    async fn empty_ledger_and_no_search_yields_no_evidence() {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let handlers = BranchHandlers::new(ledger, Arc::new(NoopSearch));
        let classification = classify("What is dark matter made of?");
        let evidence = handlers.fan_out("What is dark matter made of?", &classification).await;
        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn failing_search_does_not_poison_other_branches() {
        let handlers = BranchHandlers::new(ledger_with_verified_fact(), Arc::new(FakeSearch::failing()));
        let classification = classify("What is the speed of light in vacuum?");
        let evidence = handlers.fan_out("What is the speed of light in vacuum?", &classification).await;
        assert!(evidence.iter().any(|e| e.branch == Branch::Mimir));
        assert!(!evidence.iter().any(|e| e.branch == Branch::Hugin));
    }
}
