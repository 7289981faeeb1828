//! The instrumentation written into tagged JSX and read back at runtime.

use crate::span::TaggedElement;

/// Attribute carrying the element's span id.
pub const ID_ATTRIBUTE: &str = "data-dev-id";
/// Attribute carrying the JSON-encoded `{id, filename, location}`.
pub const SOURCE_ATTRIBUTE: &str = "data-dev-source";
/// Attribute that opts an element out of tagging.
pub const IGNORE_ATTRIBUTE: &str = "data-dev-ignore";

/// JSON form of a tagged element, as stored in `data-dev-source`.
pub struct TagPayload;

impl TagPayload {
    pub fn encode(element: &TaggedElement) -> String {
        // Serializing a struct of strings and integers cannot fail
        serde_json::to_string(element).unwrap_or_default()
    }

    /// Decode the runtime value of a `data-dev-source` attribute.
    pub fn decode(value: &str) -> Result<TaggedElement, serde_json::Error> {
        serde_json::from_str(value)
    }

    /// JSX attributes appended to an element's opening tag.
    pub fn attributes(element: &TaggedElement) -> String {
        format!(
            " {ID_ATTRIBUTE}=\"{}\" {SOURCE_ATTRIBUTE}={{{}}}",
            element.id,
            js_string(&Self::encode(element))
        )
    }

    /// Opening tag of the wrapper component around an element.
    pub fn wrapper_open(component: &str, element: &TaggedElement) -> String {
        let location = serde_json::to_string(&element.span).unwrap_or_default();
        format!(
            "<{component} id=\"{}\" filename={{{}}} location={{{location}}}>",
            element.id,
            js_string(&element.filename)
        )
    }

    pub fn wrapper_close(component: &str) -> String {
        format!("</{component}>")
    }
}

/// A JavaScript string literal for `value`. JSON strings are valid JS.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
