//! The watcher daemon.
//!
//! Three background loops, one per priority queue, each firing at its
//! queue's interval. A tick pulls up to [`BATCH_SIZE`] due nodes, rescans
//! them in windows of [`MAX_CONCURRENT_CHECKS`] via the unverified-search
//! collaborator, adjusts confidence from trust-weighted snippet evidence,
//! and emits alerts. One failing scan is logged and counted; it never
//! aborts the batch.

pub mod alerts;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ygg_common::disinfo::{self, ContentMetadata, Recommendation};
use ygg_common::node::{KnowledgeNode, PriorityQueue};
use ygg_common::YggResult;

use crate::ledger::{Ledger, ScanUpdate};
use crate::search::UnverifiedSearch;
use alerts::{Alert, AlertBuffer, AlertKind, AlertSeverity, WatcherStats};

/// Nodes fetched per tick.
pub const BATCH_SIZE: usize = 50;
/// Concurrent rescans inside a tick.
pub const MAX_CONCURRENT_CHECKS: usize = 10;
/// Velocity spike threshold in confidence points per second.
pub const VELOCITY_SPIKE_PER_SEC: f64 = 0.1;
/// Absolute confidence drop (points) that raises an alert.
pub const CONFIDENCE_DROP_POINTS: i32 = 30;
/// Maximum confidence movement per scan, before contradiction penalty.
const MAX_ADJUSTMENT_POINTS: f64 = 5.0;
/// Extra penalty when two or more snippets contradict the statement.
const CONTRADICTION_PENALTY: i32 = 20;

static CONTRADICTION_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(debunked|disproven|retracted|false claim|not true|is a myth|tilbakevist|usann)\b")
        .unwrap()
});

/// Result of one tick over one queue.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub queue_scanned: usize,
    pub changed: usize,
    pub demoted: usize,
    pub alerts: usize,
    pub failures: usize,
}

/// Outcome of rescanning a single node.
#[derive(Debug, Clone)]
struct NodeScan {
    changed: bool,
    new_confidence: Option<u8>,
    contradictions: usize,
}

/// The watcher. Shares the ledger with the pipeline; owns the alert
/// buffer and statistics, exposing read-only snapshots of both.
pub struct Watcher {
    ledger: Arc<Ledger>,
    search: Arc<dyn UnverifiedSearch>,
    alerts: Arc<AlertBuffer>,
    stats: Arc<WatcherStats>,
}

impl Watcher {
    pub fn new(ledger: Arc<Ledger>, search: Arc<dyn UnverifiedSearch>) -> Self {
        Self {
            ledger,
            search,
            alerts: Arc::new(AlertBuffer::new()),
            stats: Arc::new(WatcherStats::new()),
        }
    }

    pub fn alerts(&self) -> Arc<AlertBuffer> {
        Arc::clone(&self.alerts)
    }

    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the three queue loops. Each fires at its queue's interval;
    /// scheduling state survives restarts because `next_scan` lives in
    /// the store.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        [PriorityQueue::Hot, PriorityQueue::Warm, PriorityQueue::Cold]
            .into_iter()
            .map(|queue| {
                let watcher = Arc::clone(self);
                tokio::spawn(async move {
                    let period = queue
                        .interval()
                        .to_std()
                        .unwrap_or(std::time::Duration::from_secs(3_600));
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    // The immediate first tick scans anything already due.
                    loop {
                        interval.tick().await;
                        let report = watcher.tick(queue).await;
                        if report.queue_scanned > 0 {
                            info!(
                                queue = %queue,
                                scanned = report.queue_scanned,
                                changed = report.changed,
                                alerts = report.alerts,
                                failures = report.failures,
                                "watcher tick"
                            );
                        }
                    }
                })
            })
            .collect()
    }

    /// Run one tick for `queue`.
    pub async fn tick(&self, queue: PriorityQueue) -> TickReport {
        self.stats.record_tick();
        let due = match self.ledger.store().due_for_scan(queue, chrono::Utc::now(), BATCH_SIZE) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(queue = %queue, error = %e, "could not fetch due nodes");
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            queue_scanned: due.len(),
            ..Default::default()
        };

        let outcomes: Vec<(String, u8, YggResult<NodeScan>)> = stream::iter(due)
            .map(|node| async move {
                let id = node.id.clone();
                let prev_confidence = node.confidence;
                let scan = self.scan_node(&node).await;
                (id, prev_confidence, scan)
            })
            .buffer_unordered(MAX_CONCURRENT_CHECKS)
            .collect()
            .await;

        for (node_id, prev_confidence, scan) in outcomes {
            self.stats.scans_run.fetch_add(1, Ordering::Relaxed);
            let scan = match scan {
                Ok(scan) => scan,
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "scan failed");
                    self.stats.scan_failures.fetch_add(1, Ordering::Relaxed);
                    report.failures += 1;
                    continue;
                }
            };

            let outcome = match self.ledger.update_scan_status(
                &node_id,
                ScanUpdate {
                    changed: scan.changed,
                    new_confidence: scan.new_confidence,
                },
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "scan bookkeeping failed");
                    self.stats.scan_failures.fetch_add(1, Ordering::Relaxed);
                    report.failures += 1;
                    continue;
                }
            };

            if scan.changed {
                self.stats.nodes_changed.fetch_add(1, Ordering::Relaxed);
                report.changed += 1;
            }
            if outcome.demoted {
                self.stats.nodes_demoted.fetch_add(1, Ordering::Relaxed);
                report.demoted += 1;
            }
            report.alerts += self.emit_alerts(&outcome.node, prev_confidence, scan.contradictions);
        }

        report
    }

    /// Rescan one node against fresh unverified evidence.
    ///
    /// New confidence moves at most +-5 points toward the trust-weighted
    /// snippet average, minus 20 when two or more snippets contradict the
    /// statement outright.
    async fn scan_node(&self, node: &KnowledgeNode) -> YggResult<NodeScan> {
        let snippets = self.search.search(&node.statement, BATCH_SIZE.min(10)).await?;
        if snippets.is_empty() {
            return Ok(NodeScan {
                changed: false,
                new_confidence: None,
                contradictions: 0,
            });
        }

        let mut trusts: Vec<u32> = Vec::new();
        let mut contradictions = 0usize;
        for snippet in &snippets {
            let metadata = ContentMetadata {
                published_at: snippet.published_at,
                author: None,
            };
            let analysis = disinfo::analyze(&snippet.url, &snippet.snippet, Some(&metadata));
            if matches!(analysis.recommendation, Recommendation::Block) {
                continue;
            }
            trusts.push(100 - analysis.risk_score as u32);
            if CONTRADICTION_MARKERS.is_match(&snippet.snippet) {
                contradictions += 1;
            }
        }
        if trusts.is_empty() {
            return Ok(NodeScan {
                changed: false,
                new_confidence: None,
                contradictions: 0,
            });
        }

        let avg_trust = trusts.iter().sum::<u32>() as f64 / trusts.len() as f64;
        let adjustment = ((avg_trust - 50.0) * 0.1).clamp(-MAX_ADJUSTMENT_POINTS, MAX_ADJUSTMENT_POINTS);
        let mut new_confidence = node.confidence as i32 + adjustment.round() as i32;
        if contradictions >= 2 {
            new_confidence -= CONTRADICTION_PENALTY;
        }
        let new_confidence = new_confidence.clamp(0, 100) as u8;

        debug!(
            node_id = %node.id,
            avg_trust,
            adjustment,
            contradictions,
            new_confidence,
            "rescan"
        );

        Ok(NodeScan {
            changed: new_confidence != node.confidence || contradictions >= 2,
            new_confidence: Some(new_confidence),
            contradictions,
        })
    }

    /// Alert rules, applied to the post-update node.
    fn emit_alerts(&self, node: &KnowledgeNode, prev_confidence: u8, contradictions: usize) -> usize {
        let mut emitted = 0usize;

        let per_second = node.velocity.abs() * 1_000.0;
        if per_second > VELOCITY_SPIKE_PER_SEC {
            emitted += self.push_alert(Alert::new(
                &node.id,
                AlertKind::VelocitySpike,
                AlertSeverity::High,
                format!("velocity {:.3} points/s", node.velocity * 1_000.0),
            ));
        }
        if contradictions >= 2 {
            emitted += self.push_alert(Alert::new(
                &node.id,
                AlertKind::Contradiction,
                AlertSeverity::Critical,
                format!("{} contradicting snippets", contradictions),
            ));
        }
        let drop = prev_confidence as i32 - node.confidence as i32;
        if drop > CONFIDENCE_DROP_POINTS {
            emitted += self.push_alert(Alert::new(
                &node.id,
                AlertKind::ConfidenceDrop,
                AlertSeverity::High,
                format!("confidence fell {} points ({} -> {})", drop, prev_confidence, node.confidence),
            ));
        }

        self.stats.alerts_emitted.fetch_add(emitted as u64, Ordering::Relaxed);
        emitted
    }

    fn push_alert(&self, alert: Alert) -> usize {
        if let Err(e) = self.ledger.store().insert_alert(
            &alert.id,
            &alert.node_id,
            alert.kind.as_str(),
            alert.severity.as_str(),
            &alert.message,
            alert.created_at,
        ) {
            // The in-memory buffer still gets it; persistence failures on
            // alerts are not fatal to the scan.
            warn!(error = %e, "alert persistence failed");
        }
        self.alerts.push(alert);
        1
    }
}
