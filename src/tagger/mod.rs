//! Build-time span tagging for JSX sources.
//!
//! Each host element (`<div>`, `<p>`, ...) gets a stable id and its exact
//! source span, carried into the rendered DOM so a runtime selection can be
//! traced back to the text that produced it.

pub mod errors;
pub mod parser;
pub mod payload;
pub mod pass;
pub mod validator;

pub use errors::TaggerError;
pub use parser::{JsxParser, ParsedSource, SourceLanguage};
pub use payload::{TagPayload, ID_ATTRIBUTE, IGNORE_ATTRIBUTE, SOURCE_ATTRIBUTE};
pub use pass::{BuildMode, SpanTagger, TagOutput, TagStyle, DEFAULT_WRAPPER};
pub use validator::validate_tagged;
