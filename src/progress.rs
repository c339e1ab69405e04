//! Progress accounting
//!
//! A [`ProgressReporter`] is shared by the whole batch and only hands out
//! trackers. Each transfer owns its [`ProgressTracker`], so counters for one
//! resource are never touched by another task.

use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::events::{EventSink, ProgressValue, TransferEvent};

/// Snapshot of one resource's transfer at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub resource_name: String,
    pub bytes_transferred_total: u64,
    pub bytes_expected_total: Option<u64>,
    pub timestamp: OffsetDateTime,
}

impl ProgressSample {
    /// `floor(transferred / expected * 100)`, clamped to 100
    pub fn percent(&self) -> Option<u8> {
        let expected = self.bytes_expected_total?;
        if expected == 0 {
            return Some(100);
        }
        let percent = (self.bytes_transferred_total as u128 * 100) / expected as u128;
        Some(percent.min(100) as u8)
    }
}

#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn EventSink>,
    byte_interval: Duration,
}

impl ProgressReporter {
    /// `byte_interval` spaces out raw byte-count events for resources whose
    /// total size is unknown.
    pub fn new(sink: Arc<dyn EventSink>, byte_interval: Duration) -> Self {
        Self {
            sink,
            byte_interval,
        }
    }

    pub fn tracker(&self, resource_name: impl Into<String>) -> ProgressTracker {
        ProgressTracker {
            resource_name: resource_name.into(),
            sink: Arc::clone(&self.sink),
            byte_interval: self.byte_interval,
            transferred: 0,
            expected_at_start: None,
            last_percent: None,
            last_bytes_emit: None,
        }
    }
}

/// Per-resource progress state, carried across retry attempts
pub struct ProgressTracker {
    resource_name: String,
    sink: Arc<dyn EventSink>,
    byte_interval: Duration,
    transferred: u64,
    expected_at_start: Option<u64>,
    last_percent: Option<u8>,
    last_bytes_emit: Option<Instant>,
}

impl ProgressTracker {
    /// Seed the running total with the bytes already staged, so a resumed
    /// attempt reports progress of the whole resource.
    pub fn seed(&mut self, bytes_on_disk: u64) {
        self.transferred = bytes_on_disk;
    }

    /// Forget everything learned so far. Used when staged bytes are discarded.
    ///
    /// The next percentage emitted restarts from the beginning, so across a
    /// restart the event stream for one resource can go backwards.
    pub fn reset(&mut self) {
        self.transferred = 0;
        self.expected_at_start = None;
        self.last_percent = None;
        self.last_bytes_emit = None;
    }

    /// Record `bytes_delta` freshly written bytes.
    ///
    /// `bytes_expected_total` is the full resource size as seen by the
    /// current attempt. The first known value is kept for the rest of the
    /// transfer. Returns the value emitted to the sink, if any.
    pub fn observe(
        &mut self,
        bytes_delta: u64,
        bytes_expected_total: Option<u64>,
    ) -> Option<ProgressValue> {
        if self.expected_at_start.is_none() {
            self.expected_at_start = bytes_expected_total;
        }
        self.transferred = self.transferred.saturating_add(bytes_delta);

        let sample = self.sample();
        let value = self.render(&sample)?;
        self.sink.emit(TransferEvent::Progress {
            resource: self.resource_name.clone(),
            value,
        });
        Some(value)
    }

    pub fn sample(&self) -> ProgressSample {
        ProgressSample {
            resource_name: self.resource_name.clone(),
            bytes_transferred_total: self.transferred,
            bytes_expected_total: self.expected_at_start,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.transferred
    }

    fn render(&mut self, sample: &ProgressSample) -> Option<ProgressValue> {
        match sample.percent() {
            Some(percent) => {
                if self.last_percent.is_some_and(|last| percent <= last) {
                    return None;
                }
                self.last_percent = Some(percent);
                Some(ProgressValue::Percent(percent))
            }
            None => {
                let now = Instant::now();
                if self
                    .last_bytes_emit
                    .is_some_and(|last| now.duration_since(last) < self.byte_interval)
                {
                    return None;
                }
                self.last_bytes_emit = Some(now);
                Some(ProgressValue::Bytes(sample.bytes_transferred_total))
            }
        }
    }
}
