use crate::dispatch::cancel::CancelToken;
use crate::dispatch::request::PatchRequest;
use crate::dispatch::transform::{Transform, TransformError};
use crate::patch::{read_source, PatchError, PatchOutcome, SpanPatch};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::span::InvalidSpanError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Located,
    TransformRequested,
    TransformSucceeded,
    TransformFailed,
    Patched,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Patched | RequestState::Rejected)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("invalid span: {0}")]
    InvalidSpan(#[from] InvalidSpanError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("no generative backend configured")]
    NoTransform,

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("transform timed out after {0:?}")]
    Timeout(Duration),

    #[error("request was cancelled")]
    Cancelled,
}

/// A request that reached `Patched`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub file: PathBuf,
    /// Code found at the span before the patch
    pub original: String,
    pub replacement: String,
    pub outcome: PatchOutcome,
}

/// Runs patch requests: locate, transform, patch.
///
/// Requests against the same file are serialized in arrival order, and each
/// one holds the file from its locate step through its write, so a later
/// request always sees the result of an earlier one.
pub struct CommandDispatcher {
    guard: WorkspaceGuard,
    transform: Option<Arc<dyn Transform>>,
    timeout: Duration,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl CommandDispatcher {
    pub fn new(guard: WorkspaceGuard, transform: Option<Arc<dyn Transform>>, timeout: Duration) -> Self {
        Self {
            guard,
            transform,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        self.guard.workspace_root()
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    fn file_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks nobody is waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Run one request to a terminal state.
    ///
    /// Dropping the returned future abandons the request; a request is never
    /// patched after `cancel` has been cancelled.
    pub async fn dispatch(
        &self,
        request: PatchRequest,
        cancel: &CancelToken,
    ) -> Result<Dispatched, DispatchError> {
        let mut lifecycle = Lifecycle::new(&request);
        let result = self.run(&request, cancel, &mut lifecycle).await;
        match &result {
            Ok(dispatched) => {
                lifecycle.advance(RequestState::Patched);
                info!(
                    filename = %request.filename,
                    span = %request.span,
                    outcome = ?dispatched.outcome,
                    "patch applied"
                );
            }
            Err(error) => {
                lifecycle.advance(RequestState::Rejected);
                warn!(
                    filename = %request.filename,
                    span = %request.span,
                    error = %error,
                    "patch request rejected"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        request: &PatchRequest,
        cancel: &CancelToken,
        lifecycle: &mut Lifecycle,
    ) -> Result<Dispatched, DispatchError> {
        let path = self.guard.validate_path(&request.filename)?;

        let lock = self.file_lock(&path);
        let _held = tokio::select! {
            held = lock.lock() => held,
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };

        let source = read_source(&path)?;
        let code = source.locate(&request.span)?;
        lifecycle.advance(RequestState::Located);

        let transform = self.transform.as_ref().ok_or(DispatchError::NoTransform)?;
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        lifecycle.advance(RequestState::TransformRequested);
        let result = tokio::select! {
            r = tokio::time::timeout(self.timeout, transform.transform(&code, &request.command)) => r,
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };
        let replacement = match result {
            Ok(Ok(replacement)) => reply_line_breaks(&code, replacement),
            Ok(Err(error)) => {
                lifecycle.advance(RequestState::TransformFailed);
                return Err(error.into());
            }
            Err(_) => {
                lifecycle.advance(RequestState::TransformFailed);
                return Err(DispatchError::Timeout(self.timeout));
            }
        };
        lifecycle.advance(RequestState::TransformSucceeded);

        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        // Holding the lock, only an outside editor can have changed the span
        let outcome = SpanPatch::new(&path, request.span, replacement.as_str())
            .expecting(&code)
            .apply()?;

        Ok(Dispatched {
            file: path,
            original: code,
            replacement,
            outcome,
        })
    }
}

struct Lifecycle {
    state: RequestState,
    filename: String,
}

impl Lifecycle {
    fn new(request: &PatchRequest) -> Self {
        debug!(filename = %request.filename, span = %request.span, state = %RequestState::Received, "patch request");
        Self {
            state: RequestState::Received,
            filename: request.filename.clone(),
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug!(filename = %self.filename, from = %self.state, to = %next, "request state");
        self.state = next;
    }
}

/// Backends may answer with CRLF breaks; the patcher expects `\n` separators
/// and applies the file's own style. Code that already held carriage returns
/// is left alone so an echoed reply still patches to the same bytes.
fn reply_line_breaks(code: &str, reply: String) -> String {
    if code.contains('\r') {
        reply
    } else {
        reply.replace("\r\n", "\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceSpan;
    use async_trait::async_trait;
    use std::fs;

    struct Upper;

    #[async_trait]
    impl Transform for Upper {
        async fn transform(&self, code: &str, _command: &str) -> Result<String, TransformError> {
            Ok(code.to_uppercase())
        }
    }

    /// Answers with the code unchanged, written with CRLF breaks
    struct CrlfEcho;

    #[async_trait]
    impl Transform for CrlfEcho {
        async fn transform(&self, code: &str, _command: &str) -> Result<String, TransformError> {
            Ok(code.replace('\n', "\r\n"))
        }
    }

    struct Echo;

    #[async_trait]
    impl Transform for Echo {
        async fn transform(&self, code: &str, _command: &str) -> Result<String, TransformError> {
            Ok(code.to_string())
        }
    }

    fn setup(content: &str) -> (tempfile::TempDir, WorkspaceGuard) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("App.tsx"), content).unwrap();
        let guard = WorkspaceGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    #[tokio::test]
    async fn patches_through_transform() {
        let (dir, guard) = setup("<p>hello</p>\n");
        let dispatcher = CommandDispatcher::new(guard, Some(Arc::new(Upper)), Duration::from_secs(5));

        let request = PatchRequest::new("shout", "App.tsx", SourceSpan::from_coords(1, 3, 1, 8));
        let done = dispatcher.dispatch(request, &CancelToken::new()).await.unwrap();

        assert_eq!(done.original, "hello");
        assert_eq!(done.replacement, "HELLO");
        assert_eq!(
            fs::read_to_string(dir.path().join("App.tsx")).unwrap(),
            "<p>HELLO</p>\n"
        );
    }

    #[tokio::test]
    async fn no_transform_rejects_without_writing() {
        let (dir, guard) = setup("<p>hello</p>");
        let dispatcher = CommandDispatcher::new(guard, None, Duration::from_secs(5));

        let request = PatchRequest::new("x", "App.tsx", SourceSpan::from_coords(1, 3, 1, 8));
        let err = dispatcher.dispatch(request, &CancelToken::new()).await.unwrap_err();

        assert!(matches!(err, DispatchError::NoTransform));
        assert_eq!(fs::read_to_string(dir.path().join("App.tsx")).unwrap(), "<p>hello</p>");
    }

    #[tokio::test]
    async fn already_cancelled_request_is_rejected() {
        let (dir, guard) = setup("<p>hello</p>");
        let dispatcher = CommandDispatcher::new(guard, Some(Arc::new(Upper)), Duration::from_secs(5));

        let cancel = CancelToken::new();
        cancel.cancel();
        let request = PatchRequest::new("x", "App.tsx", SourceSpan::from_coords(1, 3, 1, 8));
        let err = dispatcher.dispatch(request, &cancel).await.unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled));
        assert_eq!(fs::read_to_string(dir.path().join("App.tsx")).unwrap(), "<p>hello</p>");
    }

    #[tokio::test]
    async fn crlf_reply_into_lf_file_keeps_lf() {
        let (dir, guard) = setup("<a>\n  x\n</a>\n");
        let dispatcher = CommandDispatcher::new(guard, Some(Arc::new(CrlfEcho)), Duration::from_secs(5));

        let request = PatchRequest::new("noop", "App.tsx", SourceSpan::from_coords(1, 0, 3, 4));
        let done = dispatcher.dispatch(request, &CancelToken::new()).await.unwrap();

        assert!(matches!(done.outcome, PatchOutcome::Unchanged { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join("App.tsx")).unwrap(),
            "<a>\n  x\n</a>\n"
        );
    }

    #[tokio::test]
    async fn echo_keeps_stray_carriage_return_in_crlf_file() {
        let content = "a\r\r\nb\r\n";
        let (dir, guard) = setup(content);
        let dispatcher = CommandDispatcher::new(guard, Some(Arc::new(Echo)), Duration::from_secs(5));

        let request = PatchRequest::new("noop", "App.tsx", SourceSpan::from_coords(1, 0, 2, 1));
        let done = dispatcher.dispatch(request, &CancelToken::new()).await.unwrap();

        assert_eq!(done.original, "a\r\nb");
        assert!(matches!(done.outcome, PatchOutcome::Unchanged { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("App.tsx")).unwrap(), content);
    }

    #[test]
    fn terminal_states() {
        assert!(RequestState::Patched.is_terminal());
        assert!(RequestState::Rejected.is_terminal());
        assert!(!RequestState::TransformFailed.is_terminal());
    }
}
