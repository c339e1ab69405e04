//! reqwest transport against a local axum server

mod common;

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use common::{Dirs, RecordingSink, payload, read};
use futures::TryStreamExt;
use stagefetch::orchestrator::{Batch, Orchestrator};
use stagefetch::retry::RetryPolicy;
use stagefetch::transport::{BodyStream, ContentRange, HttpConfig, HttpTransport, Transport};
use stagefetch::TransportErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const FILE_LEN: usize = 1000;

async fn start_mock_server() -> String {
    let app = Router::new()
        .route("/files/data.bin", get(serve_ranged))
        .route("/files/unavailable.bin", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/agent", get(echo_user_agent));

    // Bind to random available port
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", bound_addr)
}

/// Honors `Range: bytes=N-` like a typical static file server
async fn serve_ranged(headers: HeaderMap) -> Response {
    let data = payload(FILE_LEN);
    let start = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.strip_suffix('-'))
        .and_then(|v| v.parse::<usize>().ok());

    match start {
        Some(start) if start >= FILE_LEN => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{FILE_LEN}"))],
        )
            .into_response(),
        Some(start) => (
            StatusCode::PARTIAL_CONTENT,
            [(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, FILE_LEN - 1, FILE_LEN),
            )],
            data[start..].to_vec(),
        )
            .into_response(),
        None => (StatusCode::OK, data).into_response(),
    }
}

async fn echo_user_agent(headers: HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn collect(body: BodyStream) -> Vec<u8> {
    body.try_fold(Vec::new(), |mut acc, chunk| async move {
        acc.extend_from_slice(&chunk);
        Ok(acc)
    })
    .await
    .unwrap()
}

fn transport() -> HttpTransport {
    HttpTransport::new(&HttpConfig::default()).unwrap()
}

#[tokio::test]
async fn test_full_get_streams_body() {
    let base = start_mock_server().await;

    let response = transport()
        .get(&format!("{base}/files/data.bin"), None)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_length, Some(FILE_LEN as u64));
    assert_eq!(response.content_range, None);
    assert_eq!(collect(response.body).await, payload(FILE_LEN));
}

#[tokio::test]
async fn test_offset_sends_range_header() {
    let base = start_mock_server().await;

    let response = transport()
        .get(&format!("{base}/files/data.bin"), Some(400))
        .await
        .unwrap();

    assert_eq!(response.status, 206);
    assert_eq!(response.content_length, Some(600));
    assert_eq!(
        response.content_range,
        Some(ContentRange::Bytes {
            first: 400,
            last: 999,
            total: Some(1000)
        })
    );
    assert_eq!(collect(response.body).await, payload(FILE_LEN)[400..].to_vec());
}

#[tokio::test]
async fn test_unsatisfiable_range_is_a_response() {
    let base = start_mock_server().await;

    let response = transport()
        .get(&format!("{base}/files/data.bin"), Some(FILE_LEN as u64))
        .await
        .unwrap();

    assert_eq!(response.status, 416);
    assert_eq!(
        response.content_range,
        Some(ContentRange::Unsatisfied {
            total: FILE_LEN as u64
        })
    );
}

#[tokio::test]
async fn test_server_error_is_a_response() {
    let base = start_mock_server().await;

    let response = transport()
        .get(&format!("{base}/files/unavailable.bin"), None)
        .await
        .unwrap();
    assert_eq!(response.status, 503);
}

#[tokio::test]
async fn test_user_agent_is_sent() {
    let base = start_mock_server().await;
    let config = HttpConfig {
        user_agent: "mirror-bot/2.0".to_string(),
        ..HttpConfig::default()
    };

    let response = HttpTransport::new(&config)
        .unwrap()
        .get(&format!("{base}/agent"), None)
        .await
        .unwrap();
    assert_eq!(collect(response.body).await, b"mirror-bot/2.0".to_vec());
}

#[tokio::test]
async fn test_refused_connection_is_retryable_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport()
        .get(&format!("http://{addr}/files/data.bin"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::Connect);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_batch_resumes_over_http() {
    let base = start_mock_server().await;
    let dirs = Dirs::new();
    std::fs::write(dirs.staged("data.bin"), &payload(FILE_LEN)[..300]).unwrap();

    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        Arc::new(transport()),
        RetryPolicy {
            max_attempts: 2,
            backoff_base: Duration::from_millis(10),
            max_backoff: None,
        },
        sink.clone(),
    );
    let batch = Batch::from_urls(
        [format!("{base}/files/data.bin")],
        &dirs.staging,
        &dirs.published,
    )
    .unwrap();

    let outcome = orchestrator.run_batch(batch, Some(1)).await;

    let result = outcome.get("data.bin").unwrap();
    assert!(result.is_success());
    assert_eq!(result.attempts, 1);
    assert_eq!(read(&dirs.published("data.bin")), payload(FILE_LEN));
    assert_eq!(orchestrator.metrics().snapshot().bytes_written, 700);
}
