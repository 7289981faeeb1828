//! Extract the exact text covered by a span.

use crate::source::SourceText;
use crate::span::{utf16_to_byte, InvalidSpanError, SourceSpan};

/// Byte range of a validated span, relative to the start and end lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineCuts {
    /// 0-indexed start line
    pub first: usize,
    /// 0-indexed end line
    pub last: usize,
    /// Byte offset of the start column within the start line
    pub start_byte: usize,
    /// Byte offset of the end column within the end line
    pub end_byte: usize,
}

/// Validate `span` against `lines` and resolve both columns to byte offsets
/// on the original, untrimmed lines.
pub(crate) fn resolve<S: AsRef<str>>(
    lines: &[S],
    span: &SourceSpan,
) -> Result<LineCuts, InvalidSpanError> {
    span.validate(lines.len())?;

    let first = span.start.line as usize - 1;
    let last = span.end.line as usize - 1;
    let start_byte = utf16_to_byte(lines[first].as_ref(), span.start.line, span.start.column)?;
    let end_byte = utf16_to_byte(lines[last].as_ref(), span.end.line, span.end.column)?;

    Ok(LineCuts {
        first,
        last,
        start_byte,
        end_byte,
    })
}

/// Return the text covered by `span`, joining lines with `\n`.
///
/// A zero-width span yields an empty string.
pub fn locate<S: AsRef<str>>(lines: &[S], span: &SourceSpan) -> Result<String, InvalidSpanError> {
    let cuts = resolve(lines, span)?;

    if cuts.first == cuts.last {
        let line = lines[cuts.first].as_ref();
        return Ok(line[cuts.start_byte..cuts.end_byte].to_string());
    }

    let mut parts = Vec::with_capacity(cuts.last - cuts.first + 1);
    parts.push(&lines[cuts.first].as_ref()[cuts.start_byte..]);
    for line in &lines[cuts.first + 1..cuts.last] {
        parts.push(line.as_ref());
    }
    parts.push(&lines[cuts.last].as_ref()[..cuts.end_byte]);

    Ok(parts.join("\n"))
}

impl SourceText {
    /// Text covered by `span` in this file.
    pub fn locate(&self, span: &SourceSpan) -> Result<String, InvalidSpanError> {
        locate(self.lines(), span)
    }
}
