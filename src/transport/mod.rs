//! Transport port
//!
//! The engine only needs "GET this URL, optionally starting at byte N, and
//! give me the body as a stream". Connection pooling, TLS and DNS belong to
//! the implementation behind [`Transport`].

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;

use crate::error::TransportError;

pub use http::{HttpConfig, HttpTransport};

/// Lazy, finite sequence of body chunks
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Parsed `Content-Range` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// `bytes first-last/total` (total is `None` for `*`)
    Bytes {
        first: u64,
        last: u64,
        total: Option<u64>,
    },
    /// `bytes */total`, sent with 416 Range Not Satisfiable
    Unsatisfied { total: u64 },
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;

        if range.trim() == "*" {
            let total = total.trim().parse().ok()?;
            return Some(ContentRange::Unsatisfied { total });
        }

        let (first, last) = range.split_once('-')?;
        let total = match total.trim() {
            "*" => None,
            n => Some(n.parse().ok()?),
        };

        Some(ContentRange::Bytes {
            first: first.trim().parse().ok()?,
            last: last.trim().parse().ok()?,
            total,
        })
    }

    pub fn total(&self) -> Option<u64> {
        match *self {
            ContentRange::Bytes { total, .. } => total,
            ContentRange::Unsatisfied { total } => Some(total),
        }
    }
}

/// Response head plus streamed body
pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    pub body: BodyStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// HTTP GET with an optional starting byte offset
///
/// Implementations send `Range: bytes={offset}-` when `start_offset` is
/// `Some`, and report non-2xx statuses as a normal response rather than an
/// error. Only failures to obtain a response at all are `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        start_offset: Option<u64>,
    ) -> Result<TransportResponse, TransportError>;
}
