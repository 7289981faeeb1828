//! Locate/patch laws checked against real files
//!
//! - patching a span with its own text leaves the file byte-identical
//! - everything outside the span survives a patch verbatim
//! - invalid spans never touch the file

use proptest::prelude::*;
use span_patcher::{
    locate, patch, patch_text, InvalidSpanError, PatchError, PatchOutcome, Position, SourceSpan,
    SourceText,
};
use std::fs;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn single_line_extraction() {
    assert_eq!(
        locate(&["hello world"], &SourceSpan::from_coords(1, 0, 1, 5)).unwrap(),
        "hello"
    );
}

#[test]
fn multi_line_extraction_and_collapse() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "f.js", "function f() {\n  return 1;\n}");
    let span = SourceSpan::from_coords(1, 13, 3, 1);

    let source = SourceText::read(&path).unwrap();
    assert_eq!(source.locate(&span).unwrap(), "{\n  return 1;\n}");

    let outcome = patch(&path, &span, "{ return 2; }").unwrap();
    assert!(matches!(outcome, PatchOutcome::Applied { .. }));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "function f() { return 2; }"
    );
}

#[test]
fn zero_width_patch_is_insertion() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "a.tsx", "<p>hi</p>\n");
    let span = SourceSpan::point(Position::new(1, 3));

    assert_eq!(SourceText::read(&path).unwrap().locate(&span).unwrap(), "");
    patch(&path, &span, "oh, ").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "<p>oh, hi</p>\n");
}

#[test]
fn boundary_rejection_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let original = "a\nb\nc";
    let path = write_file(&dir, "a.js", original);

    let err = patch(&path, &SourceSpan::from_coords(5, 0, 5, 0), "x").unwrap_err();
    assert!(matches!(
        err,
        PatchError::InvalidSpan(InvalidSpanError::LineOutOfRange { line: 5, .. })
    ));

    let err = patch(&path, &SourceSpan::from_coords(2, 0, 1, 0), "x").unwrap_err();
    assert!(matches!(
        err,
        PatchError::InvalidSpan(InvalidSpanError::Inverted { .. })
    ));

    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn crlf_and_bom_survive_a_multi_line_patch() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "w.tsx", "\u{feff}<ul>\r\n  <li>a</li>\r\n</ul>\r\n");

    patch(&path, &SourceSpan::from_coords(2, 2, 2, 12), "<li>b</li>\n  <li>c</li>").unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "\u{feff}<ul>\r\n  <li>b</li>\r\n  <li>c</li>\r\n</ul>\r\n"
    );
}

#[test]
fn self_patch_reports_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "a.js", "let x = 1;\n");
    let span = SourceSpan::from_coords(1, 4, 1, 9);
    let text = SourceText::read(&path).unwrap().locate(&span).unwrap();

    let outcome = patch(&path, &span, &text).unwrap();
    assert!(matches!(outcome, PatchOutcome::Unchanged { .. }));
}

/// Lines drawn from ASCII, BMP and astral characters, joined with LF or CRLF.
fn file_strategy() -> impl Strategy<Value = (Vec<String>, bool)> {
    lines_of(
        prop_oneof![
            4 => proptest::char::range('a', 'z'),
            1 => Just(' '),
            1 => Just('é'),
            1 => Just('中'),
            1 => Just('😀'),
        ]
        .boxed(),
    )
}

/// Like [`file_strategy`], with stray carriage returns inside lines.
fn file_with_cr_strategy() -> impl Strategy<Value = (Vec<String>, bool)> {
    lines_of(
        prop_oneof![
            4 => proptest::char::range('a', 'z'),
            1 => Just('é'),
            1 => Just('😀'),
            2 => Just('\r'),
        ]
        .boxed(),
    )
}

fn lines_of(chars: BoxedStrategy<char>) -> impl Strategy<Value = (Vec<String>, bool)> {
    let line = proptest::collection::vec(chars, 0..12)
        .prop_map(|chars| chars.into_iter().collect::<String>());
    (proptest::collection::vec(line, 1..6), any::<bool>())
}

/// A span on `lines` whose columns land on character boundaries.
fn span_on(lines: &[String], a: (usize, usize), b: (usize, usize)) -> SourceSpan {
    let boundary = |line: &str, pick: usize| -> u32 {
        let columns: Vec<u32> = std::iter::once(0)
            .chain(line.chars().scan(0u32, |col, c| {
                *col += c.len_utf16() as u32;
                Some(*col)
            }))
            .collect();
        columns[pick % columns.len()]
    };

    let (la, lb) = (a.0 % lines.len(), b.0 % lines.len());
    let start = Position::new(la as u32 + 1, boundary(&lines[la], a.1));
    let end = Position::new(lb as u32 + 1, boundary(&lines[lb], b.1));
    if start <= end {
        SourceSpan::new(start, end)
    } else {
        SourceSpan::new(end, start)
    }
}

proptest! {
    #[test]
    fn patching_with_located_text_is_identity(
        (lines, crlf) in file_strategy(),
        a in (0usize..8, 0usize..16),
        b in (0usize..8, 0usize..16),
    ) {
        let content = lines.join(if crlf { "\r\n" } else { "\n" });
        let source = SourceText::parse(&content);
        let span = span_on(&lines, a, b);

        let text = source.locate(&span).unwrap();
        let patched = patch_text(&source, &span, &text).unwrap();
        prop_assert_eq!(patched.render(), content);
    }

    #[test]
    fn identity_holds_with_stray_carriage_returns(
        (lines, crlf) in file_with_cr_strategy(),
        a in (0usize..8, 0usize..16),
        b in (0usize..8, 0usize..16),
    ) {
        let content = lines.join(if crlf { "\r\n" } else { "\n" });
        let source = SourceText::parse(&content);
        let span = span_on(&lines, a, b);

        let text = source.locate(&span).unwrap();
        let patched = patch_text(&source, &span, &text).unwrap();
        prop_assert_eq!(patched.render(), content);
    }

    #[test]
    fn patch_preserves_surroundings(
        (lines, _) in file_strategy(),
        a in (0usize..8, 0usize..16),
        b in (0usize..8, 0usize..16),
        replacement in "[a-z<>/ ]{0,10}",
    ) {
        let content = lines.join("\n");
        let source = SourceText::parse(&content);
        let span = span_on(&lines, a, b);

        let located = source.locate(&span).unwrap();
        let patched = patch_text(&source, &span, &replacement).unwrap().render();

        // Content = prefix + located + suffix; the patch swaps only the middle
        let prefix_len = {
            let whole_start: usize = lines[..span.start.line as usize - 1]
                .iter()
                .map(|l| l.len() + 1)
                .sum();
            let line = &lines[span.start.line as usize - 1];
            let mut col = 0u32;
            let byte = line
                .char_indices()
                .find(|(_, c)| {
                    let hit = col >= span.start.column;
                    col += c.len_utf16() as u32;
                    hit
                })
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            whole_start + byte
        };
        let suffix_len = content.len() - prefix_len - located.len();

        prop_assert_eq!(&patched[..prefix_len], &content[..prefix_len]);
        prop_assert_eq!(
            &patched[patched.len() - suffix_len..],
            &content[content.len() - suffix_len..]
        );
        prop_assert_eq!(
            &patched[prefix_len..patched.len() - suffix_len],
            replacement.as_str()
        );
    }
}
