use crate::span::SourceSpan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One user action: rewrite the code at `span` in `filename` per `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub command: String,
    pub filename: String,
    #[serde(rename = "location")]
    pub span: SourceSpan,
}

impl PatchRequest {
    pub fn new(command: impl Into<String>, filename: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            command: command.into(),
            filename: filename.into(),
            span,
        }
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("malformed request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Request body as sent by the browser runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WireRequest {
    pub command: String,
    pub filename: String,
    pub location: SourceSpan,
    /// Client-chosen id that `/cancel` can refer to
    #[serde(default)]
    pub request_id: Option<String>,
}

impl WireRequest {
    /// Parse and validate a request body. Nothing here touches the disk.
    pub fn parse(body: &[u8]) -> Result<Self, SchemaError> {
        let wire: WireRequest = serde_json::from_slice(body)?;
        if wire.command.trim().is_empty() {
            return Err(SchemaError::EmptyField("command"));
        }
        if wire.filename.trim().is_empty() {
            return Err(SchemaError::EmptyField("filename"));
        }
        Ok(wire)
    }

    pub fn into_request(self) -> (PatchRequest, Option<String>) {
        (
            PatchRequest {
                command: self.command,
                filename: self.filename,
                span: self.location,
            },
            self.request_id,
        )
    }
}
