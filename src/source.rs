//! File content as an ordered sequence of lines.
//!
//! The line terminator and a leading byte-order mark are detected on parse
//! and restored on render, so `render(parse(x)) == x` for any UTF-8 input.

use std::fs;
use std::path::Path;

const BOM: char = '\u{feff}';

/// Line terminator style of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    /// `Crlf` only when every line feed is preceded by a carriage return.
    pub fn detect(content: &str) -> Self {
        let lf = content.matches('\n').count();
        let crlf = content.matches("\r\n").count();
        if lf > 0 && lf == crlf {
            LineEnding::Crlf
        } else {
            LineEnding::Lf
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }

    /// Convert the `\n` separators of located or replacement text to this
    /// style. Carriage returns already in `text` are content and stay put.
    pub fn normalize(&self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

/// Parsed file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    lines: Vec<String>,
    line_ending: LineEnding,
    bom: bool,
}

impl SourceText {
    pub fn parse(content: &str) -> Self {
        let (bom, body) = match content.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, content),
        };
        let line_ending = LineEnding::detect(body);
        let lines = body
            .split(line_ending.as_str())
            .map(str::to_string)
            .collect();
        Self {
            lines,
            line_ending,
            bom,
        }
    }

    /// Read and parse a file. Non-UTF-8 content is an `InvalidData` error.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let content = String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::parse(&content))
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            line_ending: LineEnding::Lf,
            bom: false,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn has_bom(&self) -> bool {
        self.bom
    }

    /// Replace lines `[first, last]` (0-indexed, inclusive) with one line.
    ///
    /// The replacement may carry embedded terminators; rendering joins them
    /// back verbatim.
    pub(crate) fn splice_lines(&mut self, first: usize, last: usize, replacement: String) {
        self.lines.splice(first..=last, std::iter::once(replacement));
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        out.push_str(&self.lines.join(self.line_ending.as_str()));
        out
    }
}

impl From<&str> for SourceText {
    fn from(content: &str) -> Self {
        Self::parse(content)
    }
}
