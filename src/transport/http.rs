//! reqwest-backed transport

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::debug;

use super::{ContentRange, Transport, TransportResponse};
use crate::error::{TransportError, TransportErrorKind};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Maximum idle time between body chunks; `None` waits forever
    pub read_timeout: Option<Duration>,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(30)),
            max_redirects: 10,
            user_agent: concat!("stagefetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Transport over a shared reqwest connection pool
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::limited(config.max_redirects));

        if let Some(read_timeout) = config.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        start_offset: Option<u64>,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(offset) = start_offset {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse);

        debug!(url, status, ?start_offset, ?content_length, ?content_range, "Response received");

        let body = response
            .bytes_stream()
            .map_err(map_reqwest_error)
            .boxed();

        Ok(TransportResponse {
            status,
            content_length,
            content_range,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_builder() {
        TransportErrorKind::InvalidUrl
    } else if e.is_body() || e.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, e.to_string())
}
