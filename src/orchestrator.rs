//! Download orchestrator
//!
//! Fans a batch out to one task per descriptor, bounds how many transfer at
//! once, and folds every terminal result into a [`BatchOutcome`]. Running a
//! batch never fails: failed transfers are entries in the outcome.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{DescriptorError, TransferError};
use crate::events::{EventSink, TransferEvent};
use crate::observability::Metrics;
use crate::progress::ProgressReporter;
use crate::retry::{RetryError, RetryPolicy};
use crate::transfer::{TerminalResult, TransferDescriptor, TransferStatus, TransferUnit};
use crate::transport::Transport;

/// Descriptors whose resource names are known to be unique
#[derive(Debug, Clone, Default)]
pub struct Batch {
    descriptors: Vec<TransferDescriptor>,
}

impl Batch {
    pub fn new(descriptors: Vec<TransferDescriptor>) -> Result<Self, DescriptorError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for d in &descriptors {
            if let Some(first) = seen.insert(d.resource_name(), d.source_url()) {
                return Err(DescriptorError::NameCollision {
                    name: d.resource_name().to_string(),
                    first: first.to_string(),
                    second: d.source_url().to_string(),
                });
            }
        }
        Ok(Self { descriptors })
    }

    /// Build descriptors for `urls`, dropping exact duplicate URLs
    pub fn from_urls<I, S>(
        urls: I,
        staging_dir: &Path,
        published_dir: &Path,
    ) -> Result<Self, DescriptorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut descriptors: Vec<TransferDescriptor> = Vec::new();
        for url in urls {
            let url = url.as_ref();
            if descriptors.iter().any(|d| d.source_url() == url) {
                continue;
            }
            descriptors.push(TransferDescriptor::new(url, staging_dir, published_dir)?);
        }
        Self::new(descriptors)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[TransferDescriptor] {
        &self.descriptors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every attempt failed with a retryable error
    Exhausted,
    /// A non-retryable error ended the transfer
    Fatal,
    Cancelled,
    /// The transfer task itself panicked
    Aborted,
}

/// Terminal record for one resource
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub source_url: String,
    pub status: TransferStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferOutcome {
    fn from_result(source_url: &str, result: TerminalResult) -> Self {
        match result {
            TerminalResult::Succeeded {
                published_path,
                bytes,
                attempts,
            } => Self {
                source_url: source_url.to_string(),
                status: TransferStatus::Succeeded,
                attempts,
                bytes: Some(bytes),
                published_path: Some(published_path),
                failure: None,
                error: None,
            },
            TerminalResult::Failed { attempts, error } => {
                let failure = match &error {
                    RetryError::Exhausted { .. } => FailureKind::Exhausted,
                    RetryError::Fatal { .. } => FailureKind::Fatal,
                    RetryError::Cancelled { .. } => FailureKind::Cancelled,
                };
                Self::failed(source_url, attempts, failure, error.to_string())
            }
        }
    }

    fn failed(source_url: &str, attempts: u32, failure: FailureKind, error: String) -> Self {
        Self {
            source_url: source_url.to_string(),
            status: TransferStatus::Failed,
            attempts,
            bytes: None,
            published_path: None,
            failure: Some(failure),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Succeeded
    }
}

/// Outcome of a whole batch, keyed by resource name
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub transfers: BTreeMap<String, TransferOutcome>,
}

impl BatchOutcome {
    pub fn get(&self, resource_name: &str) -> Option<&TransferOutcome> {
        self.transfers.get(resource_name)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &TransferOutcome)> {
        self.transfers
            .iter()
            .filter(|(_, o)| o.is_success())
            .map(|(name, o)| (name.as_str(), o))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &TransferOutcome)> {
        self.transfers
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(name, o)| (name.as_str(), o))
    }

    pub fn any_failed(&self) -> bool {
        self.failed().next().is_some()
    }

    fn record(&mut self, resource_name: String, outcome: TransferOutcome) {
        self.transfers.insert(resource_name, outcome);
    }
}

/// Runs batches of transfers against one transport
pub struct Orchestrator<T: ?Sized> {
    transport: Arc<T>,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
    progress_interval: Duration,
    metrics: Arc<Metrics>,
    token: CancellationToken,
}

impl<T: Transport + ?Sized + 'static> Orchestrator<T> {
    pub fn new(transport: Arc<T>, policy: RetryPolicy, sink: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            policy,
            sink,
            progress_interval: Duration::from_millis(500),
            metrics: Arc::new(Metrics::new()),
            token: CancellationToken::new(),
        }
    }

    /// Spacing of byte-count progress events for resources of unknown size
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Cancelling `token` stops admitting transfers and new attempts, and
    /// aborts body streams in flight. Staging files are kept.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run every transfer in `batch` to a terminal state.
    ///
    /// `concurrency_limit` caps how many transfers run at once; `None` starts
    /// all of them immediately.
    pub async fn run_batch(&self, batch: Batch, concurrency_limit: Option<usize>) -> BatchOutcome {
        info!(transfers = batch.len(), ?concurrency_limit, "Starting batch");

        let unit = Arc::new(TransferUnit::new(
            Arc::clone(&self.transport),
            self.policy.clone(),
            ProgressReporter::new(Arc::clone(&self.sink), self.progress_interval),
            Arc::clone(&self.sink),
            Arc::clone(&self.metrics),
            self.token.clone(),
        ));
        let permits = concurrency_limit.map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();

        for descriptor in batch.descriptors {
            let unit = Arc::clone(&unit);
            let permits = permits.clone();
            let token = self.token.clone();
            let metrics = Arc::clone(&self.metrics);
            let name = descriptor.resource_name().to_string();
            let url = descriptor.source_url().to_string();

            let handle = tasks.spawn(async move {
                let _permit = match permits {
                    Some(permits) => tokio::select! {
                        biased;
                        _ = token.cancelled() => return (descriptor, None),
                        permit = permits.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };
                if token.is_cancelled() {
                    return (descriptor, None);
                }

                metrics.transfer_started();
                let result = unit.run(&descriptor).await;
                (descriptor, Some(result))
            });
            spawned.insert(handle.id(), (name, url));
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (descriptor, Some(result)))) => {
                    if result.is_success() {
                        self.metrics.transfer_succeeded();
                    } else {
                        self.metrics.transfer_failed();
                    }
                    outcome.record(
                        descriptor.resource_name().to_string(),
                        TransferOutcome::from_result(descriptor.source_url(), result),
                    );
                }
                Ok((_, (descriptor, None))) => {
                    // Refused transfers still get a full Started/Failed pair
                    self.metrics.transfer_started();
                    self.metrics.transfer_failed();
                    let error = RetryError::<TransferError>::Cancelled { attempts: 0 };
                    self.sink.emit(TransferEvent::Started {
                        resource: descriptor.resource_name().to_string(),
                    });
                    self.sink.emit(TransferEvent::Failed {
                        resource: descriptor.resource_name().to_string(),
                        attempts: 0,
                        error: error.to_string(),
                    });
                    outcome.record(
                        descriptor.resource_name().to_string(),
                        TransferOutcome::failed(
                            descriptor.source_url(),
                            0,
                            FailureKind::Cancelled,
                            error.to_string(),
                        ),
                    );
                }
                Err(join_error) => {
                    self.metrics.transfer_failed();
                    let Some((name, url)) = spawned.remove(&join_error.id()) else {
                        error!(error = %join_error, "Unknown transfer task failed");
                        continue;
                    };
                    error!(resource = name, error = %join_error, "Transfer task aborted");
                    self.sink.emit(TransferEvent::Failed {
                        resource: name.clone(),
                        attempts: 0,
                        error: join_error.to_string(),
                    });
                    outcome.record(
                        name,
                        TransferOutcome::failed(&url, 0, FailureKind::Aborted, join_error.to_string()),
                    );
                }
            }
        }

        let failed = outcome.failed().count();
        info!(
            succeeded = outcome.transfers.len() - failed,
            failed,
            "Batch finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> TransferDescriptor {
        TransferDescriptor::new(url, Path::new("temp"), Path::new("completed")).unwrap()
    }

    #[test]
    fn test_batch_rejects_name_collision() {
        let result = Batch::new(vec![
            descriptor("https://a.example.com/files/video.mp4"),
            descriptor("https://b.example.com/other/video.mp4"),
        ]);
        match result {
            Err(DescriptorError::NameCollision { name, first, second }) => {
                assert_eq!(name, "video.mp4");
                assert!(first.starts_with("https://a."));
                assert!(second.starts_with("https://b."));
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_from_urls_skips_exact_duplicates() {
        let batch = Batch::from_urls(
            [
                "https://example.com/a.bin",
                "https://example.com/b.bin",
                "https://example.com/a.bin",
            ],
            Path::new("temp"),
            Path::new("completed"),
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_outcome_serializes_failures() {
        let mut outcome = BatchOutcome::default();
        outcome.record(
            "a.bin".to_string(),
            TransferOutcome::failed(
                "https://example.com/a.bin",
                3,
                FailureKind::Exhausted,
                "gave up".to_string(),
            ),
        );
        assert!(outcome.any_failed());

        let json = serde_json::to_value(&outcome).unwrap();
        let entry = &json["transfers"]["a.bin"];
        assert_eq!(entry["status"], "failed");
        assert_eq!(entry["failure"], "exhausted");
        assert_eq!(entry["attempts"], 3);
        assert!(entry.get("published_path").is_none());
    }
}
