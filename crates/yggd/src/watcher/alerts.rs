//! Watcher alerts and statistics.
//!
//! Alerts are persisted through the store and mirrored in an in-process
//! ring buffer bounded to the 1,000 most recent. Statistics counters are
//! atomic; readers get a consistent snapshot, never the live values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Ring buffer capacity.
pub const ALERT_BUFFER_SIZE: usize = 1_000;

/// What tripped the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    VelocitySpike,
    Contradiction,
    ConfidenceDrop,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::VelocitySpike => "VELOCITY_SPIKE",
            AlertKind::Contradiction => "CONTRADICTION",
            AlertKind::ConfidenceDrop => "CONFIDENCE_DROP",
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// One emitted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub node_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(node_id: &str, kind: AlertKind, severity: AlertSeverity, message: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            kind,
            severity,
            message,
            created_at: Utc::now(),
        }
    }
}

/// Mutex-protected ring buffer of recent alerts.
#[derive(Default)]
pub struct AlertBuffer {
    inner: Mutex<VecDeque<Alert>>,
}

impl AlertBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, alert: Alert) {
        let mut buffer = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if buffer.len() == ALERT_BUFFER_SIZE {
            buffer.pop_front();
        }
        buffer.push_back(alert);
    }

    /// Most recent `limit` alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        let buffer = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        buffer.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cumulative watcher counters. Updated via atomic increments.
#[derive(Default)]
pub struct WatcherStats {
    pub scans_run: AtomicU64,
    pub nodes_changed: AtomicU64,
    pub nodes_demoted: AtomicU64,
    pub scan_failures: AtomicU64,
    pub alerts_emitted: AtomicU64,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

/// Read-only view of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatsSnapshot {
    pub scans_run: u64,
    pub nodes_changed: u64,
    pub nodes_demoted: u64,
    pub scan_failures: u64,
    pub alerts_emitted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<DateTime<Utc>>,
}

impl WatcherStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        let mut last = self.last_tick.lock().unwrap_or_else(|p| p.into_inner());
        *last = Some(Utc::now());
    }

    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            scans_run: self.scans_run.load(Ordering::Relaxed),
            nodes_changed: self.nodes_changed.load(Ordering::Relaxed),
            nodes_demoted: self.nodes_demoted.load(Ordering::Relaxed),
            scan_failures: self.scan_failures.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            last_tick: *self.last_tick.lock().unwrap_or_else(|p| p.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_is_bounded() {
        let buffer = AlertBuffer::new();
        for i in 0..1_100 {
            buffer.push(Alert::new(
                &format!("node-{}", i),
                AlertKind::VelocitySpike,
                AlertSeverity::High,
                "spike".to_string(),
            ));
        }
        assert_eq!(buffer.len(), ALERT_BUFFER_SIZE);
        // The oldest hundred were evicted.
        let recent = buffer.recent(ALERT_BUFFER_SIZE);
        assert_eq!(recent.first().unwrap().node_id, "node-1099");
        assert_eq!(recent.last().unwrap().node_id, "node-100");
    }

    #[test]
    fn snapshot_reflects_counters() {
        let stats = WatcherStats::new();
        stats.scans_run.fetch_add(3, Ordering::Relaxed);
        stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        stats.record_tick();
        let snap = stats.snapshot();
        assert_eq!(snap.scans_run, 3);
        assert_eq!(snap.alerts_emitted, 1);
        assert!(snap.last_tick.is_some());
    }
}
