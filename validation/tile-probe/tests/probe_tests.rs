//! End-to-end probe tests against an in-process mock volume backend.

use axum::{
    extract::{Form, Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tile_probe::{
    ApiClient, HttpTileFetcher, ProbeError, ProbeRequest, ProbeRunner, ProbeState, RunnerOptions,
    TileFetch, TileStatus,
};
use volume_common::TilePathLayout;

const TILE_BYTES: usize = 128;
const NOT_FOUND_BYTES: usize = 37;
const TOKEN: &str = "t0k3n";
const EXPIRED_TOKEN: &str = "expired";

type Hits = Arc<Mutex<Vec<String>>>;

struct MockBackend {
    base: String,
    hits: Hits,
}

impl MockBackend {
    async fn start() -> Self {
        let hits: Hits = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/api/v1/auth/token", post(login))
            .route("/api/volumes", get(list_volumes))
            .route("/api/volumes/:name", delete(delete_volume))
            .route("/api/v1/memory-status", get(memory_status))
            .route("/bare/api/volumes", get(bare_volume_list))
            .route("/precomp/:volume/info", get(volume_info))
            .fallback(tile)
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            hits,
        }
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    fn runner(&self) -> ProbeRunner {
        ProbeRunner::new(
            Arc::new(HttpTileFetcher::default()),
            RunnerOptions::new(self.base.clone()),
        )
    }
}

// ============================================================================
// Mock handlers
// ============================================================================

async fn tile(State(hits): State<Hits>, uri: Uri) -> (StatusCode, Vec<u8>) {
    let path = uri.path().to_string();
    hits.lock().unwrap().push(path.clone());

    if path.starts_with("/slow/") {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if path.starts_with("/missing/") {
        return (StatusCode::NOT_FOUND, vec![b'x'; NOT_FOUND_BYTES]);
    }
    (StatusCode::OK, vec![0u8; TILE_BYTES])
}

async fn login(Form(form): Form<HashMap<String, String>>) -> Response {
    let user = form.get("username").map(String::as_str);
    let pass = form.get("password").map(String::as_str);
    let (token, role) = match (user, pass) {
        (Some("admin"), Some("secret")) => (TOKEN, "admin"),
        // Valid credentials, but the backend no longer honours the token.
        (Some("viewer"), Some("viewer")) => (EXPIRED_TOKEN, "viewer"),
        _ => return StatusCode::UNAUTHORIZED.into_response(),
    };
    Json(serde_json::json!({
        "AccessToken": token,
        "LoginId": user,
        "UserName": "Test User",
        "Role": role
    }))
    .into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", TOKEN);
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false)
}

async fn list_volumes(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({
        "volumes": [{
            "name": "demo",
            "path": "/precomp/demo",
            "info_url": "/precomp/demo/info",
            "location": "server",
            "dimensions": [1024, 512, 1],
            "chunk_size": [256, 256, 1]
        }],
        "count": 1
    }))
    .into_response()
}

async fn bare_volume_list() -> Json<serde_json::Value> {
    Json(serde_json::json!([
        {"name": "demo", "path": "/precomp/demo", "info_url": "/precomp/demo/info"}
    ]))
}

async fn memory_status(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({
        "memory": {"process_mb": 256.5, "system_percent": 37.5},
        "cache": {"cache_size_mb": 12, "cached_chunks": 40, "hit_rate": 0.5},
        "config": {"cache_max_size_mb": 200, "chunk_size": 512}
    }))
    .into_response()
}

async fn delete_volume(headers: HeaderMap, Path(name): Path<String>) -> Response {
    if !authorized(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if name != "demo" && name != "my scan" {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"detail": format!("Volume '{}' not found", name)})),
        )
            .into_response();
    }
    Json(serde_json::json!({"message": format!("Started deletion of '{}' from server", name)}))
        .into_response()
}

/// Sends full headers announcing more body than it writes, then hangs up.
async fn truncating_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: 4096\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&[0u8; 100]).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

async fn volume_info(Path(volume): Path<String>) -> Response {
    if volume != "demo" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(serde_json::json!({
        "type": "image",
        "data_type": "uint8",
        "num_channels": 1,
        "scales": [
            {"key": "0", "size": [1024, 512, 1], "resolution": [1, 1, 1], "chunk_sizes": [[256, 256, 1]]},
            {"key": "2", "size": [256, 128, 1], "resolution": [4, 4, 1], "chunk_sizes": [[64, 64, 1]]}
        ]
    }))
    .into_response()
}

// ============================================================================
// Runner tests
// ============================================================================

#[tokio::test]
async fn test_demo_volume_eight_tiles() {
    let backend = MockBackend::start().await;
    let mut runner = backend.runner();

    let batch = runner.run(ProbeRequest::new("demo", "2", 8)).await.unwrap();

    let expected: Vec<String> = [
        "/demo/2/0_0_0",
        "/demo/2/1_0_0",
        "/demo/2/2_0_0",
        "/demo/2/3_0_0",
        "/demo/2/0_1_0",
        "/demo/2/1_1_0",
        "/demo/2/2_1_0",
        "/demo/2/3_1_0",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();

    assert_eq!(batch.len(), 8);
    for (i, result) in batch.results.iter().enumerate() {
        assert_eq!(result.index, i);
        assert!(result.succeeded);
        assert_eq!(result.status, TileStatus::Http(200));
        assert_eq!(result.bytes, TILE_BYTES);
        assert_eq!(result.url, format!("{}{}", backend.base, expected[i]));
    }

    // Arrival order at the server is not guaranteed.
    let mut hits = backend.hits();
    hits.sort();
    let mut sorted_expected = expected.clone();
    sorted_expected.sort();
    assert_eq!(hits, sorted_expected);
}

#[tokio::test]
async fn test_single_tile() {
    let backend = MockBackend::start().await;
    let mut runner = backend.runner();

    let batch = runner.run(ProbeRequest::new("demo", "0", 1)).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(backend.hits(), vec!["/demo/0/0_0_0".to_string()]);
}

#[tokio::test]
async fn test_non_positive_count_sends_nothing() {
    let backend = MockBackend::start().await;
    let mut runner = backend.runner();

    for count in [0, -5] {
        let err = runner.run(ProbeRequest::new("demo", "0", count)).await.unwrap_err();
        assert!(err.is_validation());
    }
    assert!(backend.hits().is_empty());
    assert_eq!(runner.state(), ProbeState::Idle);
}

#[tokio::test]
async fn test_coords_first_layout() {
    let backend = MockBackend::start().await;
    let mut options = RunnerOptions::new(format!("{}/precomp", backend.base));
    options.layout = TilePathLayout::CoordsFirst;
    let mut runner = ProbeRunner::new(Arc::new(HttpTileFetcher::default()), options);

    runner.run(ProbeRequest::new("demo", "1", 2)).await.unwrap();
    let mut hits = backend.hits();
    hits.sort();
    assert_eq!(hits, vec!["/precomp/demo/0_0_0/1", "/precomp/demo/1_0_0/1"]);
}

#[tokio::test]
async fn test_failed_tiles_do_not_abort_siblings() {
    let backend = MockBackend::start().await;
    let mut runner = backend.runner();

    let batch = runner.run(ProbeRequest::new("missing", "0", 3)).await.unwrap();
    assert_eq!(batch.len(), 3);
    for result in &batch.results {
        assert!(!result.succeeded);
        assert_eq!(result.status, TileStatus::Http(404));
    }
    assert_eq!(backend.hits().len(), 3);
}

// ============================================================================
// Fetcher tests
// ============================================================================

#[tokio::test]
async fn test_not_found_body_is_measured() {
    let backend = MockBackend::start().await;
    let url = format!("{}/missing/0/0_0_0", backend.base);

    let result = HttpTileFetcher::default().fetch(4, &url).await;
    assert_eq!(result.index, 4);
    assert!(!result.succeeded);
    assert_eq!(result.status, TileStatus::Http(404));
    assert_eq!(result.bytes, NOT_FOUND_BYTES);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_timeout_becomes_err_status() {
    let backend = MockBackend::start().await;
    let url = format!("{}/slow/0/0_0_0", backend.base);

    let fetcher = HttpTileFetcher::default().with_timeout(Some(Duration::from_millis(200)));
    let result = fetcher.fetch(0, &url).await;
    assert!(!result.succeeded);
    assert_eq!(result.status, TileStatus::Err);
    assert_eq!(result.bytes, 0);
    assert_eq!(result.error.as_deref(), Some("timed out"));
    assert!(result.elapsed_ms < 5_000);
}

#[tokio::test]
async fn test_truncated_body_becomes_err_status() {
    let base = truncating_server().await;
    let url = format!("{}/demo/0/0_0_0", base);

    let result = HttpTileFetcher::default().fetch(2, &url).await;
    assert_eq!(result.index, 2);
    assert!(!result.succeeded);
    assert_eq!(result.status, TileStatus::Err);
    assert_eq!(result.bytes, 0);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_truncated_body_does_not_abort_batch() {
    let base = truncating_server().await;
    let mut runner = ProbeRunner::new(
        Arc::new(HttpTileFetcher::default()),
        RunnerOptions::new(base),
    );

    let batch = runner.run(ProbeRequest::new("demo", "0", 3)).await.unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.results.iter().all(|r| r.status == TileStatus::Err));
    assert_eq!(runner.state(), ProbeState::Idle);
}

// ============================================================================
// API client tests
// ============================================================================

#[tokio::test]
async fn test_login_and_list_volumes() {
    let backend = MockBackend::start().await;
    let api = ApiClient::new(format!("{}/", backend.base));

    let session = api.login("admin", "secret").await.unwrap();
    assert!(session.is_admin());
    assert_eq!(session.user_name(), "Test User");

    let volumes = api.list_volumes(&session).await.unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, "demo");
    assert_eq!(volumes[0].location.as_deref(), Some("server"));
    assert_eq!(volumes[0].chunk_size, Some([256, 256, 1]));

    session.logout();
}

#[tokio::test]
async fn test_login_rejected() {
    let backend = MockBackend::start().await;
    let api = ApiClient::new(backend.base.clone());

    let err = api.login("admin", "wrong").await.unwrap_err();
    assert!(matches!(err, ProbeError::Unauthorized(_)));
}

#[tokio::test]
async fn test_volume_info() {
    let backend = MockBackend::start().await;
    let api = ApiClient::new(backend.base.clone());
    let mount = format!("{}/precomp", backend.base);

    let info = api.volume_info(&mount, "demo").await.unwrap();
    assert_eq!(info.level_keys(), vec!["0", "2"]);
    assert_eq!(info.scale("2").unwrap().grid_extent(), (4, 2));

    let err = api.volume_info(&mount, "nope").await.unwrap_err();
    assert!(matches!(err, ProbeError::VolumeNotFound(ref v) if v == "nope"));
}

#[tokio::test]
async fn test_list_volumes_rejects_stale_token() {
    let backend = MockBackend::start().await;
    let api = ApiClient::new(backend.base.clone());

    let session = api.login("viewer", "viewer").await.unwrap();
    assert!(!session.is_admin());

    let err = api.list_volumes(&session).await.unwrap_err();
    assert!(matches!(err, ProbeError::Unauthorized(_)));
    let err = api.memory_status(&session).await.unwrap_err();
    assert!(matches!(err, ProbeError::Unauthorized(_)));
}

#[tokio::test]
async fn test_bare_volume_array_is_schema_error() {
    let backend = MockBackend::start().await;
    let session = ApiClient::new(backend.base.clone())
        .login("admin", "secret")
        .await
        .unwrap();

    let api = ApiClient::new(format!("{}/bare", backend.base));
    let err = api.list_volumes(&session).await.unwrap_err();
    match err {
        ProbeError::Schema { endpoint, .. } => assert!(endpoint.ends_with("/bare/api/volumes")),
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_memory_status() {
    let backend = MockBackend::start().await;
    let api = ApiClient::new(backend.base.clone());
    let session = api.login("admin", "secret").await.unwrap();

    let status = api.memory_status(&session).await.unwrap();
    assert_eq!(status.memory.process_mb, 256.5);
    assert_eq!(status.cache.hit_rate, 0.5);
    assert_eq!(status.config.cache_max_size_mb, 200.0);
}

#[tokio::test]
async fn test_delete_volume() {
    let backend = MockBackend::start().await;
    let api = ApiClient::new(backend.base.clone());
    let session = api.login("admin", "secret").await.unwrap();

    let message = api.delete_volume(&session, "my scan").await.unwrap();
    assert_eq!(message, "Started deletion of 'my scan' from server");

    let err = api.delete_volume(&session, "nope").await.unwrap_err();
    assert!(matches!(err, ProbeError::VolumeNotFound(ref v) if v == "nope"));

    let viewer = api.login("viewer", "viewer").await.unwrap();
    let err = api.delete_volume(&viewer, "demo").await.unwrap_err();
    assert!(matches!(err, ProbeError::Unauthorized(_)));
}
