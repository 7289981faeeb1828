//! Patch service over real HTTP
//!
//! Each test binds the router to an ephemeral port and talks to it with a
//! plain hyper client.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::{json, Value};
use span_patcher::dispatch::{CommandDispatcher, Transform, TransformError};
use span_patcher::server::{self, AppState};
use span_patcher::WorkspaceGuard;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Shout {
    delay: Duration,
}

#[async_trait]
impl Transform for Shout {
    async fn transform(&self, code: &str, _command: &str) -> Result<String, TransformError> {
        tokio::time::sleep(self.delay).await;
        Ok(code.to_uppercase())
    }
}

struct TestServer {
    addr: SocketAddr,
    dir: TempDir,
    client: Client<HttpConnector, Body>,
}

impl TestServer {
    async fn start(transform: Option<Arc<dyn Transform>>) -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/App.tsx"), "<p>hello</p>\n").unwrap();

        let dispatcher = CommandDispatcher::new(
            WorkspaceGuard::new(dir.path()).unwrap(),
            transform,
            Duration::from_secs(5),
        );
        let state = Arc::new(AppState::new(dispatcher));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, state));

        Self {
            addr,
            dir,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    fn file(&self) -> String {
        fs::read_to_string(self.dir.path().join("src/App.tsx")).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.client.request(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), 1 << 20)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn post(&self, path: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{}{}", self.addr, path))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap();
        self.send(request).await
    }
}

fn patch_body(line: u32, start: u32, end: u32) -> String {
    json!({
        "command": "shout",
        "filename": "src/App.tsx",
        "location": {
            "start": { "line": line, "column": start },
            "end": { "line": line, "column": end },
        },
    })
    .to_string()
}

#[tokio::test]
async fn health_reports_backend() {
    let server = TestServer::start(None).await;
    let request = Request::builder()
        .uri(format!("http://{}/health", server.addr))
        .body(Body::empty())
        .unwrap();

    let (status, body) = server.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["transform"], false);
}

#[tokio::test]
async fn patch_succeeds_on_both_routes() {
    let server = TestServer::start(Some(Arc::new(Shout { delay: Duration::ZERO }))).await;

    let (status, body) = server.post("/", patch_body(1, 3, 8)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["state"], "Patched");
    assert_eq!(server.file(), "<p>HELLO</p>\n");

    // Already upper case: nothing to write
    let (status, body) = server.post("/patch", patch_body(1, 3, 8)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "unchanged");
}

#[tokio::test]
async fn malformed_bodies_are_schema_errors() {
    let server = TestServer::start(Some(Arc::new(Shout { delay: Duration::ZERO }))).await;

    for body in [
        "not json".to_string(),
        json!({ "command": "x", "filename": "src/App.tsx" }).to_string(),
        json!({
            "command": "x",
            "filename": "src/App.tsx",
            "location": { "start": { "line": 1, "column": -3 }, "end": { "line": 1, "column": 2 } },
        })
        .to_string(),
    ] {
        let (status, response) = server.post("/", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "schema");
    }
    assert_eq!(server.file(), "<p>hello</p>\n");
}

#[tokio::test]
async fn invalid_span_is_unprocessable() {
    let server = TestServer::start(Some(Arc::new(Shout { delay: Duration::ZERO }))).await;

    let (status, body) = server.post("/", patch_body(7, 0, 1)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_span");
    assert_eq!(body["state"], "Rejected");
    assert_eq!(server.file(), "<p>hello</p>\n");
}

#[tokio::test]
async fn missing_backend_is_not_implemented() {
    let server = TestServer::start(None).await;

    let (status, body) = server.post("/", patch_body(1, 3, 8)).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"], "no_transform");
    assert_eq!(server.file(), "<p>hello</p>\n");
}

#[tokio::test]
async fn cancel_abandons_an_in_flight_request() {
    let server = Arc::new(
        TestServer::start(Some(Arc::new(Shout {
            delay: Duration::from_secs(2),
        })))
        .await,
    );

    let body = json!({
        "command": "shout",
        "filename": "src/App.tsx",
        "requestId": "req-1",
        "location": { "start": { "line": 1, "column": 3 }, "end": { "line": 1, "column": 8 } },
    })
    .to_string();
    let pending = {
        let server = server.clone();
        tokio::spawn(async move { server.post("/", body).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = server.post("/cancel", json!({ "requestId": "req-1" }).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "cancelled");
    assert_eq!(server.file(), "<p>hello</p>\n");

    // The id is released once its request finishes
    let (status, _) = server.post("/cancel", json!({ "requestId": "req-1" }).to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight_is_cached() {
    let server = TestServer::start(None).await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri(format!("http://{}/", server.addr))
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = server.client.request(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "600");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
