//! Process-wide job counters, reported periodically by the bootstrap reporter.
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Monotonic counters shared by every in-flight delivery.
///
/// Only the job processor increments these. Nothing is persisted; a restart
/// starts from zero.
#[derive(Debug)]
pub struct WorkerStats {
    total_processed: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    started_at_ms: AtomicI64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatsSnapshot {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub retried: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_ms: i64,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            total_processed: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            started_at_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let started_at_ms = self.started_at_ms.load(Ordering::Relaxed);
        let started_at = Utc
            .timestamp_millis_opt(started_at_ms)
            .single()
            .unwrap_or_else(Utc::now);

        WorkerStatsSnapshot {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            started_at,
            uptime_ms: (Utc::now().timestamp_millis() - started_at_ms).max(0),
        }
    }

    /// Operator reset: zeroes every counter and restarts the uptime clock.
    pub fn reset(&self) {
        self.total_processed.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.retried.store(0, Ordering::Relaxed);
        self.started_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}
