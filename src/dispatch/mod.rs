//! Patch requests from the browser runtime to the file on disk.
//!
//! A request names a file, a span and a free-text command. The dispatcher
//! extracts the code at the span, asks a generative [`Transform`] for the
//! replacement, and writes it back with the span patcher.

pub mod cancel;
pub mod dispatcher;
pub mod request;
pub mod transform;

pub use cancel::CancelToken;
pub use dispatcher::{CommandDispatcher, DispatchError, Dispatched, RequestState};
pub use request::{PatchRequest, SchemaError, WireRequest};
pub use transform::{strip_code_fence, HttpTransform, Transform, TransformError};
