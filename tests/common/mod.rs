//! In-memory transport and helpers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use stagefetch::events::{EventSink, TransferEvent};
use stagefetch::transport::{ContentRange, Transport, TransportResponse};
use stagefetch::{TransportError, TransportErrorKind};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

/// What the next request for a URL should do instead of serving normally
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with this status and an empty body
    Status(u16),
    /// Fail before any response arrives
    Connect,
    /// Serve normally but break the body after this many bytes
    CutAfter(u64),
}

#[derive(Debug, Clone)]
struct Resource {
    data: Vec<u8>,
    honors_range: bool,
}

/// One request seen by the fake
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub start_offset: Option<u64>,
    pub at: Instant,
}

#[derive(Default)]
struct Inner {
    resources: HashMap<String, Resource>,
    faults: HashMap<String, VecDeque<Fault>>,
    requests: Vec<Request>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Scripted HTTP stand-in: serves byte ranges from memory and injects faults
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
    chunk_size: usize,
    latency: Duration,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            chunk_size: 64,
            latency: Duration::ZERO,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delay before each response head; use with a paused clock
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn serve(&self, url: &str, data: impl Into<Vec<u8>>) {
        self.insert(url, data.into(), true);
    }

    /// Serve a resource from a server that ignores `Range`
    pub fn serve_without_ranges(&self, url: &str, data: impl Into<Vec<u8>>) {
        self.insert(url, data.into(), false);
    }

    fn insert(&self, url: &str, data: Vec<u8>, honors_range: bool) {
        self.inner
            .lock()
            .resources
            .insert(url.to_string(), Resource { data, honors_range });
    }

    /// Queue faults for consecutive requests to `url`
    pub fn fail_next(&self, url: &str, faults: impl IntoIterator<Item = Fault>) {
        self.inner
            .lock()
            .faults
            .entry(url.to_string())
            .or_default()
            .extend(faults);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().requests.clone()
    }

    pub fn requests_for(&self, url: &str) -> Vec<Request> {
        self.requests().into_iter().filter(|r| r.url == url).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().max_in_flight
    }

    fn respond(&self, url: &str, start_offset: Option<u64>) -> Result<TransportResponse, TransportError> {
        let mut inner = self.inner.lock();
        let fault = inner.faults.get_mut(url).and_then(VecDeque::pop_front);

        let cut_after = match fault {
            Some(Fault::Connect) => {
                return Err(TransportError::new(
                    TransportErrorKind::Connect,
                    "connection refused",
                ));
            }
            Some(Fault::Status(status)) => return Ok(empty(status, None)),
            Some(Fault::CutAfter(n)) => Some(n),
            None => None,
        };

        let Some(resource) = inner.resources.get(url) else {
            return Ok(empty(404, None));
        };
        let total = resource.data.len() as u64;

        let (status, start, content_range) = match start_offset {
            Some(offset) if resource.honors_range => {
                if offset >= total {
                    return Ok(empty(416, Some(ContentRange::Unsatisfied { total })));
                }
                let range = ContentRange::Bytes {
                    first: offset,
                    last: total - 1,
                    total: Some(total),
                };
                (206, offset, Some(range))
            }
            _ => (200, 0, None),
        };

        let body = resource.data[start as usize..].to_vec();
        let content_length = Some(body.len() as u64);
        Ok(TransportResponse {
            status,
            content_length,
            content_range,
            body: chunked(body, self.chunk_size, cut_after),
        })
    }
}

fn empty(status: u16, content_range: Option<ContentRange>) -> TransportResponse {
    TransportResponse {
        status,
        content_length: Some(0),
        content_range,
        body: futures::stream::empty().boxed(),
    }
}

fn chunked(
    data: Vec<u8>,
    chunk_size: usize,
    cut_after: Option<u64>,
) -> stagefetch::transport::BodyStream {
    let limit = cut_after.map_or(data.len(), |n| (n as usize).min(data.len()));
    let mut items: Vec<Result<Bytes, TransportError>> = data[..limit]
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    if cut_after.is_some() {
        items.push(Err(TransportError::new(
            TransportErrorKind::Body,
            "connection reset mid-body",
        )));
    }
    futures::stream::iter(items).boxed()
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(
        &self,
        url: &str,
        start_offset: Option<u64>,
    ) -> Result<TransportResponse, TransportError> {
        {
            let mut inner = self.inner.lock();
            inner.requests.push(Request {
                url: url.to_string(),
                start_offset,
                at: Instant::now(),
            });
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = self.respond(url, start_offset);
        self.inner.lock().in_flight -= 1;
        response
    }
}

/// Sink that keeps every event for later inspection
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<TransferEvent>>);

impl RecordingSink {
    pub fn events(&self) -> Vec<TransferEvent> {
        self.0.lock().clone()
    }

    pub fn events_for(&self, resource: &str) -> Vec<TransferEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.resource() == resource)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TransferEvent) {
        self.0.lock().push(event);
    }
}

/// Staging and published directories under one temp root
pub struct Dirs {
    _root: TempDir,
    pub staging: PathBuf,
    pub published: PathBuf,
}

impl Dirs {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("temp");
        let published = root.path().join("completed");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::create_dir_all(&published).unwrap();
        Self {
            _root: root,
            staging,
            published,
        }
    }

    pub fn staged(&self, name: &str) -> PathBuf {
        self.staging.join(name)
    }

    pub fn published(&self, name: &str) -> PathBuf {
        self.published.join(name)
    }
}

/// Deterministic non-repeating payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}
