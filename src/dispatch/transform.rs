//! Generative backends that turn (code, command) into replacement code.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::json;
use thiserror::Error;

/// Upper bound on a backend response body.
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

const SYSTEM_PROMPT: &str = "You rewrite a snippet of UI source code according to an instruction. \
Reply with only the full replacement snippet, no explanation.";

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("invalid backend request: {0}")]
    Request(String),

    #[error("backend unreachable: {0}")]
    Http(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected backend response: {0}")]
    Response(String),

    #[error("{0}")]
    Backend(String),
}

/// Maps existing code and a free-text command to replacement code.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self, code: &str, command: &str) -> Result<String, TransformError>;
}

/// OpenAI-compatible chat-completions backend, over `http://` or `https://`.
pub struct HttpTransform {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTransform {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    fn build_request(&self, code: &str, command: &str) -> Result<Request<Body>, TransformError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Code:\n{code}\n\nInstruction: {command}") },
            ],
        });

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }

        builder
            .body(Body::from(body.to_string()))
            .map_err(|e| TransformError::Request(e.to_string()))
    }
}

#[async_trait]
impl Transform for HttpTransform {
    async fn transform(&self, code: &str, command: &str) -> Result<String, TransformError> {
        let request = self.build_request(code, command)?;
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "-> transform request");

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransformError::Http(e.to_string()))?;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| TransformError::Http(e.to_string()))?;
        tracing::debug!(status = %status, bytes = bytes.len(), "<- transform response");

        if status != StatusCode::OK {
            return Err(TransformError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| TransformError::Response(e.to_string()))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| TransformError::Response("missing choices[0].message.content".into()))?;

        Ok(strip_code_fence(content).to_string())
    }
}

/// Strip a surrounding Markdown code fence (with optional info string).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    match body.split_once('\n') {
        Some((_info, code)) => code.strip_suffix('\n').unwrap_or(code),
        None => body,
    }
}
