//! Line/column source spans and the identities derived from them.
//!
//! Lines are 1-indexed. Columns are 0-indexed UTF-16 code units, exclusive
//! on the end column and inclusive on the end line, matching the locations
//! a JavaScript toolchain reports for JSX nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A single point in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 1-indexed line number
    pub line: u32,
    /// 0-indexed column in UTF-16 code units
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A contiguous region of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: Position,
    pub end: Position,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidSpanError {
    #[error("line numbers are 1-indexed, got line 0")]
    ZeroLine,

    #[error("line {line} is outside the file ({line_count} lines)")]
    LineOutOfRange { line: u32, line_count: usize },

    #[error("span end {end} precedes start {start}")]
    Inverted { start: Position, end: Position },

    #[error("column {column} on line {line} falls inside a surrogate pair")]
    SplitsCharacter { line: u32, column: u32 },
}

impl SourceSpan {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Shorthand for `SourceSpan::new(Position::new(..), Position::new(..))`.
    pub fn from_coords(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self::new(
            Position::new(start_line, start_column),
            Position::new(end_line, end_column),
        )
    }

    /// A zero-width span at `position`.
    pub fn point(position: Position) -> Self {
        Self::new(position, position)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_single_line(&self) -> bool {
        self.start.line == self.end.line
    }

    /// Check the ordering invariant and that both lines exist in a file of
    /// `line_count` lines.
    pub fn validate(&self, line_count: usize) -> Result<(), InvalidSpanError> {
        if self.start.line == 0 || self.end.line == 0 {
            return Err(InvalidSpanError::ZeroLine);
        }

        for line in [self.start.line, self.end.line] {
            if line as usize > line_count {
                return Err(InvalidSpanError::LineOutOfRange { line, line_count });
            }
        }

        if self.start > self.end {
            return Err(InvalidSpanError::Inverted {
                start: self.start,
                end: self.end,
            });
        }

        Ok(())
    }

    /// Deterministic identity for this span in `filename`.
    pub fn id_in(&self, filename: &str) -> SpanId {
        SpanId::derive(filename, self)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected a span like `3:4-5:0`, got `{0}`")]
pub struct SpanParseError(pub String);

impl std::str::FromStr for SourceSpan {
    type Err = SpanParseError;

    /// Parse the `L:C-L:C` form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SpanParseError(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(err)?;
        let parse_pos = |p: &str| -> Option<Position> {
            let (line, column) = p.trim().split_once(':')?;
            Some(Position::new(line.parse().ok()?, column.parse().ok()?))
        };
        Ok(Self::new(
            parse_pos(start).ok_or_else(err)?,
            parse_pos(end).ok_or_else(err)?,
        ))
    }
}

/// Stable identity of a source construct: xxh3 of `(filename, span)`.
///
/// The same element in an unchanged file gets the same id on every build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(String);

impl SpanId {
    pub fn derive(filename: &str, span: &SourceSpan) -> Self {
        let key = format!("{filename}\u{0}{span}");
        SpanId(format!("{:016x}", xxh3_64(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SpanId {
    fn from(s: &str) -> Self {
        SpanId(s.to_string())
    }
}

impl From<String> for SpanId {
    fn from(s: String) -> Self {
        SpanId(s)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A span back-reference carried by an instrumented element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedElement {
    pub id: SpanId,
    pub filename: String,
    #[serde(rename = "location")]
    pub span: SourceSpan,
}

impl TaggedElement {
    /// Build an element whose id is derived from its filename and span.
    pub fn new(filename: impl Into<String>, span: SourceSpan) -> Self {
        let filename = filename.into();
        Self {
            id: span.id_in(&filename),
            filename,
            span,
        }
    }
}

/// Byte offset of UTF-16 `column` within `line`.
///
/// Columns past the end of the line clamp to its length. A column that lands
/// between the two halves of a surrogate pair has no byte equivalent.
pub(crate) fn utf16_to_byte(line: &str, line_no: u32, column: u32) -> Result<usize, InvalidSpanError> {
    let target = column as usize;
    let mut units = 0usize;
    for (byte, ch) in line.char_indices() {
        if units == target {
            return Ok(byte);
        }
        units += ch.len_utf16();
        if units > target {
            return Err(InvalidSpanError::SplitsCharacter {
                line: line_no,
                column,
            });
        }
    }
    Ok(line.len())
}

/// UTF-16 column of byte offset `byte` within `line`.
pub(crate) fn byte_to_utf16(line: &str, byte: usize) -> u32 {
    let end = byte.min(line.len());
    line[..end].encode_utf16().count() as u32
}
