//! Span Patcher: point at a rendered element, rewrite the source that made it
//!
//! A source-span addressing and text-patch engine for JSX projects. A build
//! step tags every host element with a stable id and the exact span it was
//! written at; the running app resolves a selected element back to
//! `{filename, span}`; the patch service extracts the code at that span,
//! optionally rewrites it through a generative backend, and writes the result
//! back into the file.
//!
//! # Architecture
//!
//! All writes compile down to one primitive: [`SpanPatch`], a replacement of
//! the text covered by a [`SourceSpan`]. Spans use 1-indexed lines and
//! 0-indexed UTF-16 columns, end-exclusive on columns and inclusive on lines.
//!
//! - [`tagger`]: build-time pass attaching ids and spans to JSX elements
//! - [`registry`]: runtime table of mounted tagged elements
//! - [`locate`]: extract the text at a span
//! - [`patch`]: replace the text at a span
//! - [`dispatch`]: locate, transform and patch one request, serialized per file
//! - [`server`]: the HTTP patch service
//!
//! # Safety
//!
//! - `patch(f, span, locate(f, span))` leaves the file byte-identical
//! - Atomic file writes (tempfile + fsync + rename)
//! - Line endings and byte-order marks are preserved
//! - Patch targets are confined to the project root
//!
//! # Example
//!
//! ```no_run
//! use span_patcher::{SourceSpan, SpanPatch};
//!
//! let span: SourceSpan = "1:13-3:1".parse().unwrap();
//! let patch = SpanPatch::new("src/App.tsx", span, "{ return 2; }");
//!
//! match patch.apply() {
//!     Ok(outcome) => println!("Patch applied: {:?}", outcome),
//!     Err(e) => eprintln!("Patch failed: {}", e),
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod inspect;
pub mod locate;
pub mod patch;
pub mod pool;
pub mod registry;
pub mod safety;
pub mod server;
pub mod source;
pub mod span;
pub mod tagger;

// Re-exports
pub use config::{load_from_path, load_from_str, Config, ConfigError};
pub use dispatch::{
    CancelToken, CommandDispatcher, DispatchError, HttpTransform, PatchRequest, RequestState,
    SchemaError, Transform, TransformError,
};
pub use locate::locate;
pub use patch::{patch, patch_text, PatchError, PatchOutcome, SpanPatch, SpanVerification};
pub use registry::{MountGuard, MountId, RegistryError, RegistryHandle, SpanRegistry};
pub use safety::{SafetyError, WorkspaceGuard};
pub use source::{LineEnding, SourceText};
pub use span::{InvalidSpanError, Position, SourceSpan, SpanId, TaggedElement};
pub use tagger::{BuildMode, SpanTagger, TagOutput, TagStyle, TaggerError};
