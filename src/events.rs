//! Status and progress events emitted by the engine
//!
//! The engine never writes to the console. It hands [`TransferEvent`]s to an
//! [`EventSink`], and whoever owns the sink decides how to render them.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Progress payload: a percentage when the total is known, raw bytes otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressValue {
    Percent(u8),
    Bytes(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    Started {
        resource: String,
    },
    Progress {
        resource: String,
        value: ProgressValue,
    },
    Retrying {
        resource: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Succeeded {
        resource: String,
        published_path: PathBuf,
    },
    Failed {
        resource: String,
        attempts: u32,
        error: String,
    },
}

impl TransferEvent {
    pub fn resource(&self) -> &str {
        match self {
            TransferEvent::Started { resource }
            | TransferEvent::Progress { resource, .. }
            | TransferEvent::Retrying { resource, .. }
            | TransferEvent::Succeeded { resource, .. }
            | TransferEvent::Failed { resource, .. } => resource,
        }
    }
}

/// Destination for transfer events
///
/// Sinks are shared by every transfer in a batch, so `emit` must be safe to
/// call concurrently and must not interleave partial writes.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransferEvent);
}

/// Forwards events to a single consumer over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: TransferEvent) {
        // Receiver gone means nobody is rendering; the transfer keeps going.
        let _ = self.tx.send(event);
    }
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TransferEvent) {
        match event {
            TransferEvent::Started { resource } => info!(resource, "Transfer started"),
            TransferEvent::Progress { resource, value } => match value {
                ProgressValue::Percent(percent) => info!(resource, percent, "Progress"),
                ProgressValue::Bytes(bytes) => info!(resource, bytes, "Progress"),
            },
            TransferEvent::Retrying {
                resource,
                attempt,
                delay,
                error,
            } => warn!(
                resource,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error,
                "Retrying transfer"
            ),
            TransferEvent::Succeeded {
                resource,
                published_path,
            } => info!(resource, path = %published_path.display(), "Transfer published"),
            TransferEvent::Failed {
                resource,
                attempts,
                error,
            } => error!(resource, attempts, error, "Transfer failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(TransferEvent::Started {
            resource: "a.bin".to_string(),
        });
        sink.emit(TransferEvent::Progress {
            resource: "a.bin".to_string(),
            value: ProgressValue::Percent(10),
        });
        drop(sink);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, TransferEvent::Started { .. }));
        assert_eq!(second.resource(), "a.bin");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(TransferEvent::Started {
            resource: "a.bin".to_string(),
        });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = TransferEvent::Progress {
            resource: "a.bin".to_string(),
            value: ProgressValue::Bytes(42),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["value"]["bytes"], 42);
    }
}
