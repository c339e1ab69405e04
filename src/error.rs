//! Failure taxonomy for transfers
//!
//! Every failure a transfer can hit is classified here as retryable or not.
//! The retry controller never inspects errors itself; it calls
//! [`TransferError::is_retryable`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Broad category of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not establish a connection (DNS, refused, reset)
    Connect,
    /// Connect or read deadline elapsed
    Timeout,
    /// Stream broke while reading the response body
    Body,
    /// Request could not be built from the URL
    InvalidUrl,
    Other,
}

/// Failure reported by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, TransportErrorKind::InvalidUrl)
    }
}

/// Failure of a single transfer attempt
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("server error: HTTP {0}")]
    ServerStatus(u16),

    #[error("client error: HTTP {0}")]
    ClientStatus(u16),

    #[error("unexpected status: HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("server answered range request for offset {requested} starting at {served}")]
    RangeMismatch { requested: u64, served: u64 },

    #[error("staging file holds {on_disk} bytes but remote reports {remote_total:?}; restarting")]
    StaleStaging {
        on_disk: u64,
        remote_total: Option<u64>,
    },

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish {} to {}: {source}", from.display(), to.display())]
    Publish {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Network failures, 5xx responses and stale staging files are worth
    /// another attempt. Everything else fails the transfer immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Transport(e) => e.is_retryable(),
            TransferError::ServerStatus(_) | TransferError::StaleStaging { .. } => true,
            TransferError::ClientStatus(_)
            | TransferError::UnexpectedStatus(_)
            | TransferError::RangeMismatch { .. }
            | TransferError::Io { .. }
            | TransferError::Publish { .. }
            | TransferError::Cancelled => false,
        }
    }

    /// Map a non-success HTTP status into the matching variant
    pub fn from_status(status: u16) -> Self {
        match status {
            500..=599 => TransferError::ServerStatus(status),
            400..=499 => TransferError::ClientStatus(status),
            _ => TransferError::UnexpectedStatus(status),
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Rejected transfer descriptors or batches
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("URL '{0}' has no file name in its path")]
    NoResourceName(String),

    #[error("resource name '{name}' is produced by both '{first}' and '{second}'")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },
}
