//! HTTP patch service.
//!
//! Accepts the browser runtime's `{command, filename, location}` body, runs it
//! through the [`CommandDispatcher`] and answers with a JSON acknowledgement or
//! error. Requests may carry a `requestId` so that `POST /cancel` can abandon
//! them while their transform is still running.

use crate::config::Config;
use crate::dispatch::{
    CancelToken, CommandDispatcher, DispatchError, Dispatched, HttpTransform, RequestState,
    SchemaError, Transform, WireRequest,
};
use crate::patch::{PatchError, PatchOutcome};
use crate::safety::{SafetyError, WorkspaceGuard};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

/// Preflight cache lifetime advertised to browsers.
const CORS_MAX_AGE: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid project root: {0}")]
    Root(#[from] SafetyError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared across handlers.
pub struct AppState {
    dispatcher: CommandDispatcher,
    /// Cancel handles of requests submitted with a `requestId`
    inflight: Mutex<HashMap<String, CancelToken>>,
}

impl AppState {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self {
            dispatcher,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Build the dispatcher described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let guard = WorkspaceGuard::new(&config.server.root)?;
        let transform = config.transform.endpoint.as_ref().map(|endpoint| {
            Arc::new(HttpTransform::new(
                endpoint.clone(),
                config.transform.model.clone(),
                config.transform.api_key(),
            )) as Arc<dyn Transform>
        });
        if transform.is_none() {
            info!("no transform endpoint configured; patch requests will be rejected");
        }
        Ok(Self::new(CommandDispatcher::new(
            guard,
            transform,
            config.transform.timeout(),
        )))
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    fn track(&self, request_id: &str, token: &CancelToken) -> bool {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight.contains_key(request_id) {
            return false;
        }
        inflight.insert(request_id.to_string(), token.clone());
        true
    }

    fn cancel(&self, request_id: &str) -> bool {
        let inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        match inflight.get(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn untrack(&self, request_id: &str) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.remove(request_id);
    }
}

/// Removes a tracked request id when its handler finishes or is dropped.
struct InflightGuard<'a> {
    state: &'a AppState,
    request_id: String,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.state.untrack(&self.request_id);
    }
}

/// Router with every route and the CORS layer applied.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(patch_handler))
        .route("/patch", post(patch_handler))
        .route("/cancel", post(cancel_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .max_age(CORS_MAX_AGE),
        )
}

/// Serve `state` on an already bound listener until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind the configured address and run the patch service.
pub async fn run(config: &Config) -> Result<(), ServerError> {
    let state = Arc::new(AppState::from_config(config)?);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(
        "patch service listening on http://{} (root: {})",
        listener.local_addr()?,
        state.dispatcher.workspace_root().display()
    );
    serve(listener, state).await
}

async fn patch_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let wire = match WireRequest::parse(&body) {
        Ok(wire) => wire,
        Err(error) => return schema_error(&error),
    };
    let (request, request_id) = wire.into_request();
    debug!(filename = %request.filename, span = %request.span, "<- patch request");

    let cancel = CancelToken::new();
    let _tracked = match request_id {
        Some(request_id) => {
            if !state.track(&request_id, &cancel) {
                return error_response(
                    StatusCode::CONFLICT,
                    "duplicate_request",
                    format!("request `{request_id}` is already in flight"),
                );
            }
            Some(InflightGuard {
                state: &state,
                request_id,
            })
        }
        None => None,
    };

    match state.dispatcher.dispatch(request, &cancel).await {
        Ok(dispatched) => patched_response(&dispatched),
        Err(error) => dispatch_error(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CancelBody {
    request_id: String,
}

async fn cancel_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let cancel: CancelBody = match serde_json::from_slice(&body) {
        Ok(cancel) => cancel,
        Err(error) => return schema_error(&SchemaError::Json(error)),
    };

    if state.cancel(&cancel.request_id) {
        info!(request_id = %cancel.request_id, "patch request cancelled");
        Json(json!({ "status": "cancelled", "requestId": cancel.request_id })).into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no request `{}` in flight", cancel.request_id),
        )
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "transform": state.dispatcher.has_transform(),
    }))
    .into_response()
}

fn patched_response(dispatched: &Dispatched) -> Response {
    let outcome = match dispatched.outcome {
        PatchOutcome::Applied { .. } => "applied",
        PatchOutcome::Unchanged { .. } => "unchanged",
    };
    Json(json!({
        "status": "ok",
        "state": RequestState::Patched.to_string(),
        "outcome": outcome,
        "replacement": dispatched.replacement,
    }))
    .into_response()
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "state": RequestState::Rejected.to_string(),
            "message": message,
        })),
    )
        .into_response()
}

fn schema_error(error: &SchemaError) -> Response {
    error_response(StatusCode::BAD_REQUEST, "schema", error.to_string())
}

/// HTTP status and error code for a rejected request.
pub fn status_for(error: &DispatchError) -> (StatusCode, &'static str) {
    match error {
        DispatchError::Safety(SafetyError::Canonicalize { .. }) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        DispatchError::Safety(_) => (StatusCode::FORBIDDEN, "forbidden"),
        DispatchError::InvalidSpan(_) | DispatchError::Patch(PatchError::InvalidSpan(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_span")
        }
        DispatchError::Patch(PatchError::BeforeTextMismatch { .. }) => {
            (StatusCode::CONFLICT, "stale_span")
        }
        DispatchError::Patch(PatchError::Io(_) | PatchError::Utf8(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "io")
        }
        DispatchError::NoTransform => (StatusCode::NOT_IMPLEMENTED, "no_transform"),
        DispatchError::Transform(_) => (StatusCode::BAD_GATEWAY, "transform"),
        DispatchError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        DispatchError::Cancelled => (StatusCode::CONFLICT, "cancelled"),
    }
}

fn dispatch_error(error: &DispatchError) -> Response {
    let (status, code) = status_for(error);
    error_response(status, code, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TransformError;
    use crate::span::{InvalidSpanError, SourceSpan};
    use std::path::PathBuf;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                DispatchError::Safety(SafetyError::ForbiddenPath {
                    path: PathBuf::from("node_modules/x.js"),
                    dir: "node_modules".into(),
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                DispatchError::InvalidSpan(InvalidSpanError::ZeroLine),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DispatchError::Patch(PatchError::BeforeTextMismatch {
                    file: PathBuf::from("a.tsx"),
                    span: SourceSpan::from_coords(1, 0, 1, 1),
                    found: "x".into(),
                }),
                StatusCode::CONFLICT,
            ),
            (DispatchError::NoTransform, StatusCode::NOT_IMPLEMENTED),
            (
                DispatchError::Transform(TransformError::Backend("boom".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                DispatchError::Timeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (DispatchError::Cancelled, StatusCode::CONFLICT),
        ];

        for (error, expected) in cases {
            assert_eq!(status_for(&error).0, expected, "{error}");
        }
    }

    #[test]
    fn duplicate_request_ids_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(dir.path()).unwrap();
        let state = AppState::new(CommandDispatcher::new(guard, None, Duration::from_secs(1)));

        let token = CancelToken::new();
        assert!(state.track("r1", &token));
        assert!(!state.track("r1", &CancelToken::new()));

        assert!(state.cancel("r1"));
        assert!(token.is_cancelled());

        state.untrack("r1");
        assert!(!state.cancel("r1"));
    }
}
