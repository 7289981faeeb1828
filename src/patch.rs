use crate::locate::resolve;
use crate::source::SourceText;
use crate::span::{InvalidSpanError, SourceSpan};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Replacement of the text covered by a span with new text.
///
/// Everything before `start.column` on the start line and everything from
/// `end.column` on the end line is kept verbatim; nothing else in the file
/// moves.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "SpanPatch does nothing until apply() is called"]
pub struct SpanPatch {
    /// Path to the file to patch
    pub file: PathBuf,
    pub span: SourceSpan,
    /// Text to put in place of the span
    pub new_text: String,
    /// What we expect to find at the span before writing, if anything
    pub expected_before: Option<SpanVerification>,
}

/// Verification strategy for the text currently at a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl SpanVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            SpanVerification::ExactMatch(expected) => text == expected,
            SpanVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            SpanVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            SpanVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("invalid span: {0}")]
    InvalidSpan(#[from] InvalidSpanError),

    #[error("text at {file}:{span} changed since it was located")]
    BeforeTextMismatch {
        file: PathBuf,
        span: SourceSpan,
        found: String,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not valid UTF-8")]
    Utf8(PathBuf),
}

/// Result of applying a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for applied/unchanged"]
pub enum PatchOutcome {
    /// The file was rewritten
    Applied { file: PathBuf, bytes_written: usize },
    /// The patched content equals the current content; nothing was written
    Unchanged { file: PathBuf },
}

/// Splice `new_text` into `source` at `span`, in memory.
///
/// The start line up to `start.column`, the new text, and the end line from
/// `end.column` form one replacement line that takes the place of the whole
/// line range. Line breaks inside `new_text` are converted to the file's
/// line ending.
pub fn patch_text(
    source: &SourceText,
    span: &SourceSpan,
    new_text: &str,
) -> Result<SourceText, InvalidSpanError> {
    let cuts = resolve(source.lines(), span)?;
    let lines = source.lines();

    let prefix = &lines[cuts.first][..cuts.start_byte];
    let suffix = &lines[cuts.last][cuts.end_byte..];
    let replacement = format!(
        "{prefix}{}{suffix}",
        source.line_ending().normalize(new_text)
    );

    let mut patched = source.clone();
    patched.splice_lines(cuts.first, cuts.last, replacement);
    Ok(patched)
}

/// Read `file`, replace the text at `span` with `new_text`, write it back.
pub fn patch(
    file: impl AsRef<Path>,
    span: &SourceSpan,
    new_text: &str,
) -> Result<PatchOutcome, PatchError> {
    SpanPatch::new(file.as_ref(), *span, new_text).apply()
}

impl SpanPatch {
    pub fn new(file: impl Into<PathBuf>, span: SourceSpan, new_text: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            span,
            new_text: new_text.into(),
            expected_before: None,
        }
    }

    /// Require the span to still contain `expected` when the patch is applied.
    pub fn expecting(mut self, expected: &str) -> Self {
        self.expected_before = Some(SpanVerification::from_text(expected));
        self
    }

    pub fn with_verification(mut self, verification: SpanVerification) -> Self {
        self.expected_before = Some(verification);
        self
    }

    /// Compute the patched content without writing it.
    pub fn preview(&self) -> Result<(SourceText, SourceText), PatchError> {
        let original = read_source(&self.file)?;

        if let Some(expected) = &self.expected_before {
            let current = original.locate(&self.span)?;
            if !expected.matches(&current) {
                return Err(PatchError::BeforeTextMismatch {
                    file: self.file.clone(),
                    span: self.span,
                    found: current,
                });
            }
        }

        let patched = patch_text(&original, &self.span, &self.new_text)?;
        Ok((original, patched))
    }

    /// Apply this patch to the file system atomically.
    ///
    /// Uses tempfile + fsync + rename, so a failed write leaves the
    /// original file in place.
    pub fn apply(&self) -> Result<PatchOutcome, PatchError> {
        let (original, patched) = self.preview()?;

        let content = patched.render();
        if content == original.render() {
            return Ok(PatchOutcome::Unchanged {
                file: self.file.clone(),
            });
        }

        atomic_write(&self.file, content.as_bytes())?;
        touch(&self.file);

        Ok(PatchOutcome::Applied {
            file: self.file.clone(),
            bytes_written: content.len(),
        })
    }
}

/// Bump mtime so dev-server watchers pick the change up. The content is
/// already in place, so a failure here is only logged.
fn touch(path: &Path) {
    if let Err(error) = filetime::set_file_mtime(path, filetime::FileTime::now()) {
        tracing::warn!(path = %path.display(), %error, "failed to update mtime after patch");
    }
}

/// Read a file for patching. Non-UTF-8 content is `PatchError::Utf8`.
pub fn read_source(path: &Path) -> Result<SourceText, PatchError> {
    SourceText::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => PatchError::Utf8(path.to_path_buf()),
        _ => PatchError::Io(e),
    })
}

/// Atomic file write: tempfile + fsync + rename.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the original permissions
    if let Ok(meta) = fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
