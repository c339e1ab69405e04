//! Batch counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle shared by every transfer in a batch
#[derive(Debug, Default)]
pub struct Metrics {
    transfers_started: AtomicU64,
    transfers_succeeded: AtomicU64,
    transfers_failed: AtomicU64,
    retries_scheduled: AtomicU64,
    bytes_written: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfer_started(&self) {
        self.transfers_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transfers_started", "Metric incremented");
    }

    pub fn transfer_succeeded(&self) {
        self.transfers_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transfers_succeeded", "Metric incremented");
    }

    pub fn transfer_failed(&self) {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transfers_failed", "Metric incremented");
    }

    pub fn retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Called per chunk, so no log line here
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transfers_started: self.transfers_started.load(Ordering::Relaxed),
            transfers_succeeded: self.transfers_succeeded.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transfers_started: u64,
    pub transfers_succeeded: u64,
    pub transfers_failed: u64,
    pub retries_scheduled: u64,
    pub bytes_written: u64,
}
