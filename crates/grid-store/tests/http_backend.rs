//! Integration test: read stores over HTTP range requests.
//!
//! An axum server bound to 127.0.0.1:0 serves store files with
//! `Range`/`Content-Range` support and counts every request, so tests can
//! check exactly how often the transport is reached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use grid_store::{
    Backend, BlockCache, CompressionKind, Dimensions, HttpBackend, HttpBackendConfig, StoreConfig,
    StoreError, StoreReader, StoreWriter,
};
use test_utils::create_test_grid;
use test_utils::fixtures::{scale, shapes};

#[derive(Clone)]
struct ServerState {
    files: Arc<HashMap<String, Bytes>>,
    requests: Arc<AtomicU64>,
    /// Number of upcoming requests answered with 503.
    fail_next: Arc<AtomicU64>,
    honor_range: bool,
}

impl ServerState {
    fn new(files: Vec<(&str, Bytes)>) -> Self {
        Self {
            files: Arc::new(
                files
                    .into_iter()
                    .map(|(name, data)| (name.to_string(), data))
                    .collect(),
            ),
            requests: Arc::new(AtomicU64::new(0)),
            fail_next: Arc::new(AtomicU64::new(0)),
            honor_range: true,
        }
    }

    fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Parse `bytes=start-end`.
fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn serve_file(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if state
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let Some(data) = state.files.get(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !state.honor_range {
        return (StatusCode::OK, data.clone()).into_response();
    }

    let len = data.len();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);
    match range {
        Some((start, end)) if start <= end && start < len => {
            let end = end.min(len - 1);
            (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, len))],
                data.slice(start..=end),
            )
                .into_response()
        }
        _ => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", len))],
        )
            .into_response(),
    }
}

async fn spawn_server(state: ServerState) -> String {
    let app = Router::new()
        .route("/:name", get(serve_file))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    format!("http://{}", addr)
}

fn http_config() -> HttpBackendConfig {
    HttpBackendConfig {
        request_timeout_secs: 5,
        connect_timeout_secs: 2,
        max_retries: 3,
        initial_retry_delay_ms: 10,
        max_retry_delay_ms: 50,
    }
}

fn large_store() -> (Vec<f32>, Bytes) {
    let (d0, d1, c0, c1) = shapes::LARGE;
    let values = create_test_grid(d0 as usize, d1 as usize);
    let dims = Dimensions::new(d0, d1, c0, c1).expect("Failed to create dimensions");
    let mut writer = StoreWriter::new(dims, CompressionKind::LossyInteger, scale::UNIT)
        .expect("Failed to create writer");
    writer.write_all(&values).expect("Failed to write values");
    let bytes = writer.finish().expect("Failed to finish store").into_bytes();
    (values, bytes)
}

#[tokio::test]
async fn test_http_read_matches_source() {
    let (values, bytes) = large_store();
    let state = ServerState::new(vec![("large.grds", bytes.clone())]);
    let base = spawn_server(state).await;

    let backend = HttpBackend::open(&format!("{}/large.grds", base), http_config())
        .await
        .expect("Failed to open remote store");
    assert_eq!(backend.len(), bytes.len() as u64);

    let config = StoreConfig {
        io_size_max: 4096,
        max_concurrent_requests: 4,
        ..Default::default()
    };
    let reader = StoreReader::open_with_config(backend, config)
        .await
        .expect("Failed to open store");

    let out = reader.read(100..110, 0..721).await.expect("Failed to read");
    assert_eq!(out, values[100 * 721..110 * 721]);
    let out = reader
        .read_concurrent(100..110, 0..721)
        .await
        .expect("Failed to read concurrently");
    assert_eq!(out, values[100 * 721..110 * 721]);
}

#[tokio::test]
async fn test_http_missing_resource_is_not_found() {
    let base = spawn_server(ServerState::new(vec![])).await;
    let result = HttpBackend::open(&format!("{}/missing.grds", base), http_config()).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_http_server_without_range_support() {
    let mut state = ServerState::new(vec![("plain.grds", Bytes::from(vec![0u8; 128]))]);
    state.honor_range = false;
    let base = spawn_server(state).await;

    let result = HttpBackend::open(&format!("{}/plain.grds", base), http_config()).await;
    assert!(matches!(result, Err(StoreError::BackendUnavailable(_))));
}

#[tokio::test]
async fn test_http_resource_smaller_than_header() {
    let state = ServerState::new(vec![("tiny.grds", Bytes::from_static(b"0123456789"))]);
    let base = spawn_server(state).await;

    let result = HttpBackend::open(&format!("{}/tiny.grds", base), http_config()).await;
    assert!(matches!(result, Err(StoreError::OutOfRange(_))));
}

#[tokio::test]
async fn test_http_transient_errors_are_retried() {
    let (_, bytes) = large_store();
    let state = ServerState::new(vec![("large.grds", bytes)]);
    state.fail_next.store(2, Ordering::SeqCst);
    let base = spawn_server(state.clone()).await;

    HttpBackend::open(&format!("{}/large.grds", base), http_config())
        .await
        .expect("Open should succeed after retries");
    assert_eq!(state.requests(), 3);

    state.fail_next.store(10, Ordering::SeqCst);
    let result = HttpBackend::open(&format!("{}/large.grds", base), http_config()).await;
    assert!(matches!(result, Err(StoreError::BackendUnavailable(_))));
}

#[tokio::test]
async fn test_cached_second_read_never_reaches_transport() {
    let (values, bytes) = large_store();
    let state = ServerState::new(vec![("large.grds", bytes)]);
    let base = spawn_server(state.clone()).await;

    let cache = Arc::new(BlockCache::new(65536, 50).expect("Failed to create cache"));
    let backend = HttpBackend::open(&format!("{}/large.grds", base), http_config())
        .await
        .expect("Failed to open remote store");
    let reader = StoreReader::open_cached(backend, Arc::clone(&cache), StoreConfig::default())
        .await
        .expect("Failed to open store");

    let first = reader.read(250..251, 420..421).await.expect("Failed to read");
    assert_eq!(first, vec![values[250 * 721 + 420]]);
    let requests = state.requests();

    let second = reader.read(250..251, 420..421).await.expect("Failed to read");
    assert_eq!(second, first);
    assert_eq!(state.requests(), requests);
    assert!(cache.stats().hits > 0);
}

#[tokio::test]
async fn test_concurrent_cached_readers_share_fetches() {
    let (values, bytes) = large_store();
    let state = ServerState::new(vec![("large.grds", bytes)]);
    let base = spawn_server(state.clone()).await;
    let url = format!("{}/large.grds", base);

    // Baseline: one reader, one read
    let before = state.requests();
    let cache = Arc::new(BlockCache::new(65536, 50).expect("Failed to create cache"));
    let backend = HttpBackend::open(&url, http_config())
        .await
        .expect("Failed to open remote store");
    let reader = StoreReader::open_cached(backend, cache, StoreConfig::default())
        .await
        .expect("Failed to open store");
    reader.read(600..601, 0..721).await.expect("Failed to read");
    let single = state.requests() - before;

    // Same work with 8 concurrent reads against a cold cache
    let before = state.requests();
    let cache = Arc::new(BlockCache::new(65536, 50).expect("Failed to create cache"));
    let backend = HttpBackend::open(&url, http_config())
        .await
        .expect("Failed to open remote store");
    let reader = Arc::new(
        StoreReader::open_cached(backend, cache, StoreConfig::default())
            .await
            .expect("Failed to open store"),
    );
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move { reader.read(600..601, 0..721).await })
        })
        .collect();
    for task in tasks {
        let out = task.await.expect("Task panicked").expect("Failed to read");
        assert_eq!(out, values[600 * 721..601 * 721]);
    }
    assert_eq!(state.requests() - before, single);
}
