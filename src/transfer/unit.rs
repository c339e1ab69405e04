//! Transfer unit: resume detection, range request, streaming write, publish

use futures::StreamExt;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{TransferDescriptor, TransferState};
use crate::error::TransferError;
use crate::events::{EventSink, TransferEvent};
use crate::observability::Metrics;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::retry::{RetryError, RetryPolicy};
use crate::transport::{BodyStream, ContentRange, Transport, TransportResponse};

/// Terminal outcome of one transfer
#[derive(Debug)]
pub enum TerminalResult {
    Succeeded {
        published_path: PathBuf,
        bytes: u64,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        error: RetryError<TransferError>,
    },
}

impl TerminalResult {
    pub fn attempts(&self) -> u32 {
        match self {
            TerminalResult::Succeeded { attempts, .. } | TerminalResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminalResult::Succeeded { .. })
    }
}

/// How a response maps onto the staging file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePlan {
    /// Append the body after the bytes already staged
    Append { expected_total: Option<u64> },
    /// Server ignored the range; discard staged bytes and write the full body
    Restart { expected_total: Option<u64> },
    /// Remote has exactly the staged bytes; nothing left to fetch
    AlreadyComplete,
    /// Remote no longer matches the staged bytes
    Stale { remote_total: Option<u64> },
}

fn plan_write(
    offset: u64,
    status: u16,
    content_length: Option<u64>,
    content_range: Option<ContentRange>,
) -> Result<WritePlan, TransferError> {
    // A bogus Content-Length that overflows is treated as an unknown total
    let remaining_total = content_length.and_then(|len| offset.checked_add(len));

    match status {
        206 => match content_range {
            Some(ContentRange::Bytes {
                total: Some(total), ..
            }) if total < offset => Ok(WritePlan::Stale {
                remote_total: Some(total),
            }),
            Some(ContentRange::Bytes { first, total, .. }) => {
                if first != offset {
                    return Err(TransferError::RangeMismatch {
                        requested: offset,
                        served: first,
                    });
                }
                Ok(WritePlan::Append {
                    expected_total: total.or(remaining_total),
                })
            }
            _ => Ok(WritePlan::Append {
                expected_total: remaining_total,
            }),
        },
        200..=299 if offset > 0 => Ok(WritePlan::Restart {
            expected_total: content_length,
        }),
        200..=299 => Ok(WritePlan::Append {
            expected_total: content_length,
        }),
        416 if offset > 0 => match content_range.and_then(|r| r.total()) {
            Some(total) if total == offset => Ok(WritePlan::AlreadyComplete),
            remote_total => Ok(WritePlan::Stale { remote_total }),
        },
        _ => Err(TransferError::from_status(status)),
    }
}

/// Per-run mutable state. Only the owning unit touches it; the mutex exists
/// because the retry closure is re-entered once per attempt.
struct RunState {
    state: TransferState,
    tracker: ProgressTracker,
}

/// Drives one descriptor from pending to a terminal state
pub struct TransferUnit<T: ?Sized> {
    transport: Arc<T>,
    policy: RetryPolicy,
    reporter: ProgressReporter,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    token: CancellationToken,
}

impl<T: Transport + ?Sized> TransferUnit<T> {
    pub fn new(
        transport: Arc<T>,
        policy: RetryPolicy,
        reporter: ProgressReporter,
        sink: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
        token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            policy,
            reporter,
            sink,
            metrics,
            token,
        }
    }

    pub async fn run(&self, descriptor: &TransferDescriptor) -> TerminalResult {
        let span = info_span!("transfer", resource = descriptor.resource_name());
        self.run_inner(descriptor).instrument(span).await
    }

    async fn run_inner(&self, descriptor: &TransferDescriptor) -> TerminalResult {
        let resource = descriptor.resource_name();
        self.sink.emit(TransferEvent::Started {
            resource: resource.to_string(),
        });

        let run_state = Mutex::new(RunState {
            state: TransferState::new(self.policy.max_attempts),
            tracker: self.reporter.tracker(resource),
        });
        let cell = &run_state;

        let result = self
            .policy
            .execute(
                &self.token,
                move |attempt| self.attempt(descriptor, cell, attempt),
                TransferError::is_retryable,
                |notice| {
                    cell.lock().state.record_error(notice.error);
                    self.metrics.retry_scheduled();
                    self.sink.emit(TransferEvent::Retrying {
                        resource: resource.to_string(),
                        attempt: notice.attempt,
                        delay: notice.delay,
                        error: notice.error.to_string(),
                    });
                },
            )
            .await;

        let attempts = run_state.lock().state.attempt_count;
        let outcome = match result {
            Ok(bytes) => match publish(descriptor).await {
                Ok(()) => Ok(bytes),
                Err(error) => Err(RetryError::Fatal { attempts, error }),
            },
            // Cancellation observed mid-attempt surfaces as a fatal error
            Err(RetryError::Fatal {
                attempts,
                error: TransferError::Cancelled,
            }) => Err(RetryError::Cancelled { attempts }),
            Err(error) => Err(error),
        };

        let mut run_state = run_state.into_inner();
        match outcome {
            Ok(bytes) => {
                run_state.state.succeed();
                info!(bytes, attempts, path = %descriptor.published_path().display(), "Published");
                self.sink.emit(TransferEvent::Succeeded {
                    resource: resource.to_string(),
                    published_path: descriptor.published_path().to_path_buf(),
                });
                TerminalResult::Succeeded {
                    published_path: descriptor.published_path().to_path_buf(),
                    bytes,
                    attempts,
                }
            }
            Err(error) => {
                error!(attempts = error.attempts(), error = %error, "Transfer failed");
                run_state.state.fail(&error);
                self.sink.emit(TransferEvent::Failed {
                    resource: resource.to_string(),
                    attempts: error.attempts(),
                    error: error.to_string(),
                });
                TerminalResult::Failed {
                    attempts: error.attempts(),
                    error,
                }
            }
        }
    }

    /// One attempt. Returns the staging file length once the body is fully
    /// written.
    async fn attempt(
        &self,
        descriptor: &TransferDescriptor,
        cell: &Mutex<RunState>,
        attempt: u32,
    ) -> Result<u64, TransferError> {
        let started = Instant::now();
        let staging = descriptor.staging_path();

        // Re-measured every attempt: a failed attempt may have appended bytes.
        let offset = staged_len(staging).await?;
        cell.lock().state.begin_attempt(offset);

        if offset > 0 {
            info!(attempt, offset, "Resuming from {offset} bytes");
        } else {
            info!(attempt, "Starting from 0 bytes");
        }

        let request = self
            .transport
            .get(descriptor.source_url(), (offset > 0).then_some(offset));
        let response = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(TransferError::Cancelled),
            response = request => response?,
        };

        let TransportResponse {
            status,
            content_length,
            content_range,
            body,
        } = response;

        let (mut file, start, expected_total) =
            match plan_write(offset, status, content_length, content_range)? {
                WritePlan::Append { expected_total } => {
                    let file = open_staging(staging, false).await?;
                    cell.lock().tracker.seed(offset);
                    (file, offset, expected_total)
                }
                WritePlan::Restart { expected_total } => {
                    warn!(offset, status, "Server ignored range request, restarting from 0");
                    let file = open_staging(staging, true).await?;
                    let mut run = cell.lock();
                    run.tracker.reset();
                    run.tracker.seed(0);
                    (file, 0, expected_total)
                }
                WritePlan::AlreadyComplete => {
                    debug!(offset, "Staging file already holds the full resource");
                    let mut run = cell.lock();
                    run.tracker.seed(offset);
                    run.tracker.observe(0, Some(offset));
                    return Ok(offset);
                }
                WritePlan::Stale { remote_total } => {
                    open_staging(staging, true).await?;
                    cell.lock().tracker.reset();
                    return Err(TransferError::StaleStaging {
                        on_disk: offset,
                        remote_total,
                    });
                }
            };

        let streamed = self.stream_body(body, &mut file, staging, cell, expected_total).await;
        // Flush before reporting either way, so the next attempt measures
        // every byte that made it to disk.
        let flushed = file.flush().await;
        let written = streamed?;
        flushed.map_err(|e| TransferError::io("flush", staging, e))?;
        file.sync_all()
            .await
            .map_err(|e| TransferError::io("sync", staging, e))?;

        debug!(
            attempt,
            written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Attempt finished"
        );
        Ok(start + written)
    }

    async fn stream_body(
        &self,
        mut body: BodyStream,
        file: &mut File,
        staging: &Path,
        cell: &Mutex<RunState>,
        expected_total: Option<u64>,
    ) -> Result<u64, TransferError> {
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(TransferError::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                return Ok(written);
            };
            let chunk = chunk?;

            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::io("write", staging, e))?;

            let len = chunk.len() as u64;
            written += len;
            self.metrics.add_bytes(len);
            cell.lock().tracker.observe(len, expected_total);
        }
    }
}

/// Size of the staging file; a missing file is a fresh start
async fn staged_len(path: &Path) -> Result<u64, TransferError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(TransferError::io("inspect", path, e)),
    }
}

async fn open_staging(path: &Path, truncate: bool) -> Result<File, TransferError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options
        .open(path)
        .await
        .map_err(|e| TransferError::io("open", path, e))
}

/// Same-filesystem rename; never falls back to copying, so a partial file can
/// never appear under the published name.
async fn publish(descriptor: &TransferDescriptor) -> Result<(), TransferError> {
    let from = descriptor.staging_path();
    let to = descriptor.published_path();
    fs::rename(from, to)
        .await
        .map_err(|source| TransferError::Publish {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}
