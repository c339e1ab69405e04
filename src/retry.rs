//! Bounded retry with exponential backoff
//!
//! The controller knows nothing about HTTP or files. It runs an attempt
//! closure, asks a classifier whether a failure is worth retrying, and sleeps
//! `backoff_base * 2^attempt` between attempts (no jitter, optional ceiling).

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Ceiling applied to every computed delay; `None` leaves growth unbounded
    pub max_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            max_backoff: Some(Duration::from_secs(10)),
        }
    }
}

/// Terminal outcome of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("non-retryable failure on attempt {attempts}: {error}")]
    Fatal {
        attempts: u32,
        #[source]
        error: E,
    },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Fatal { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    /// The underlying failure of the last attempt, if one ran
    pub fn cause(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Handed to the retry observer right before a backoff sleep
#[derive(Debug)]
pub struct RetryNotice<'a, E> {
    /// 1-based index of the attempt that just failed
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a E,
}

impl RetryPolicy {
    /// Delay slept after the `attempt`-th failure (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self.backoff_base.saturating_mul(multiplier);
        match self.max_backoff {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }

    /// Run `attempt_fn` until it succeeds, fails with a non-retryable error,
    /// runs out of attempts, or `token` is cancelled.
    ///
    /// Attempts are strictly sequential: the next one starts only after the
    /// previous failure has been classified and its backoff has elapsed.
    pub async fn execute<T, E, F, Fut, C, N>(
        &self,
        token: &CancellationToken,
        mut attempt_fn: F,
        classify: C,
        mut on_retry: N,
    ) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        N: FnMut(RetryNotice<'_, E>),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if token.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let error = match attempt_fn(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !classify(&error) {
                return Err(RetryError::Fatal {
                    attempts: attempt,
                    error,
                });
            }
            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, backing off"
            );
            on_retry(RetryNotice {
                attempt,
                delay,
                error: &error,
            });

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
