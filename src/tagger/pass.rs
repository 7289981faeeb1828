use crate::pool::with_parser;
use crate::span::{byte_to_utf16, Position, SourceSpan, TaggedElement};
use crate::tagger::errors::TaggerError;
use crate::tagger::parser::{ParsedSource, SourceLanguage};
use crate::tagger::payload::{TagPayload, IGNORE_ATTRIBUTE, SOURCE_ATTRIBUTE};
use crate::tagger::validator::validate_tagged;
use std::path::Path;
use tree_sitter::Node;

/// Default name of the instrumentation wrapper component.
pub const DEFAULT_WRAPPER: &str = "DevElement";

/// Which build configuration the tagger is running under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    Development,
    #[default]
    Production,
}

impl BuildMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "development" | "dev" => Some(BuildMode::Development),
            "production" | "prod" => Some(BuildMode::Production),
            _ => None,
        }
    }

    /// `Development` only when `NODE_ENV` says so.
    pub fn from_env() -> Self {
        match std::env::var("NODE_ENV") {
            Ok(v) if v == "development" => BuildMode::Development,
            _ => BuildMode::Production,
        }
    }
}

/// How a tagged element carries its span into the rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagStyle {
    /// `data-dev-id` / `data-dev-source` attributes on the element itself
    #[default]
    Attribute,
    /// Surround the element with `<component id filename location>`
    Wrapper { component: String },
}

/// Result of a tagging pass over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOutput {
    /// The instrumented source
    pub code: String,
    /// Every element tagged, in source order
    pub elements: Vec<TaggedElement>,
}

impl TagOutput {
    fn untouched(source: &str) -> Self {
        Self {
            code: source.to_string(),
            elements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum InsertKind {
    Open,
    Close,
}

/// A pending text insertion at a byte offset of the original source.
#[derive(Debug)]
struct Insertion {
    offset: usize,
    kind: InsertKind,
    text: String,
}

/// Build-time pass that tags host JSX elements with their source spans.
#[derive(Debug, Clone, Default)]
pub struct SpanTagger {
    mode: BuildMode,
    style: TagStyle,
}

impl SpanTagger {
    pub fn new(mode: BuildMode, style: TagStyle) -> Self {
        Self { mode, style }
    }

    pub fn development() -> Self {
        Self::new(BuildMode::Development, TagStyle::Attribute)
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    fn wrapper_name(&self) -> &str {
        match &self.style {
            TagStyle::Wrapper { component } => component,
            TagStyle::Attribute => DEFAULT_WRAPPER,
        }
    }

    /// Tag every taggable element of `source`.
    ///
    /// `filename` is recorded verbatim in each element. Outside development
    /// builds the source is returned unchanged.
    pub fn tag_source(
        &self,
        filename: &str,
        source: &str,
        language: SourceLanguage,
    ) -> Result<TagOutput, TaggerError> {
        if self.mode != BuildMode::Development {
            return Ok(TagOutput::untouched(source));
        }

        let (elements, insertions) = with_parser(language, |parser| {
            let parsed = parser.parse_with_source(source)?;
            let mut walk = Walk {
                tagger: self,
                parsed: &parsed,
                lines: LineIndex::new(source),
                filename,
                elements: Vec::new(),
                insertions: Vec::new(),
            };
            walk.visit(parsed.root_node());
            Ok::<_, TaggerError>((walk.elements, walk.insertions))
        })??;

        if elements.is_empty() {
            return Ok(TagOutput::untouched(source));
        }

        let code = apply_insertions(source, insertions);
        validate_tagged(filename, source, &code, language)?;

        tracing::debug!(filename, tagged = elements.len(), "tagged source");

        Ok(TagOutput { code, elements })
    }

    /// Read and tag a file. The grammar is picked from its extension.
    pub fn tag_file(&self, path: &Path, filename: &str) -> Result<TagOutput, TaggerError> {
        let language = SourceLanguage::from_path(path).ok_or_else(|| TaggerError::UnsupportedFile {
            path: path.to_path_buf(),
        })?;
        let source = std::fs::read_to_string(path).map_err(|source| TaggerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.tag_source(filename, &source, language)
    }
}

/// Insert bottom-to-top so earlier offsets stay valid. At equal offsets an
/// opening wrapper is inserted before a closing one, which leaves the
/// closing tag of the earlier element first in the output.
fn apply_insertions(source: &str, mut insertions: Vec<Insertion>) -> String {
    insertions.sort_by(|a, b| b.offset.cmp(&a.offset).then(a.kind.cmp(&b.kind)));

    let mut code = source.to_string();
    for insertion in insertions {
        code.insert_str(insertion.offset, &insertion.text);
    }
    code
}

/// Byte offsets of line starts, for turning tree-sitter points into
/// UTF-16 columns.
struct LineIndex<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn position(&self, point: tree_sitter::Point) -> Position {
        let start = self.starts.get(point.row).copied().unwrap_or(self.source.len());
        let end = self
            .starts
            .get(point.row + 1)
            .copied()
            .unwrap_or(self.source.len());
        let mut line = &self.source[start..end];
        let mut column = point.column;

        // Columns are counted after a byte-order mark
        if point.row == 0 {
            if let Some(rest) = line.strip_prefix('\u{feff}') {
                line = rest;
                column = column.saturating_sub('\u{feff}'.len_utf8());
            }
        }

        Position::new(point.row as u32 + 1, byte_to_utf16(line, column))
    }
}

struct Walk<'t, 'p, 's> {
    tagger: &'t SpanTagger,
    parsed: &'p ParsedSource<'s>,
    lines: LineIndex<'s>,
    filename: &'t str,
    elements: Vec<TaggedElement>,
    insertions: Vec<Insertion>,
}

impl Walk<'_, '_, '_> {
    fn visit(&mut self, node: Node<'_>) {
        if matches!(node.kind(), "jsx_element" | "jsx_self_closing_element") {
            self.maybe_tag(node);
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn maybe_tag(&mut self, element: Node<'_>) {
        // Nodes without a concrete location
        if element.is_missing() || element.byte_range().is_empty() {
            return;
        }

        let Some(tag) = opening_tag(element) else {
            return;
        };
        // Fragments have no name
        let Some(name) = tag.child_by_field_name("name") else {
            return;
        };
        if !is_host_element(name, self.parsed.node_text(name)) {
            return;
        }

        let attributes = attribute_names(self.parsed, tag);
        if attributes
            .iter()
            .any(|a| *a == IGNORE_ATTRIBUTE || *a == SOURCE_ATTRIBUTE)
        {
            return;
        }
        if self.is_wrapped(element) {
            return;
        }

        let span = SourceSpan::new(
            self.lines.position(element.start_position()),
            self.lines.position(element.end_position()),
        );
        let tagged = TaggedElement::new(self.filename, span);

        match &self.tagger.style {
            TagStyle::Attribute => self.insertions.push(Insertion {
                offset: name.end_byte(),
                kind: InsertKind::Open,
                text: TagPayload::attributes(&tagged),
            }),
            TagStyle::Wrapper { component } => {
                self.insertions.push(Insertion {
                    offset: element.start_byte(),
                    kind: InsertKind::Open,
                    text: TagPayload::wrapper_open(component, &tagged),
                });
                self.insertions.push(Insertion {
                    offset: element.end_byte(),
                    kind: InsertKind::Close,
                    text: TagPayload::wrapper_close(component),
                });
            }
        }

        self.elements.push(tagged);
    }

    /// Whether `element` is the direct child of an instrumentation wrapper.
    fn is_wrapped(&self, element: Node<'_>) -> bool {
        let Some(parent) = element.parent() else {
            return false;
        };
        if parent.kind() != "jsx_element" {
            return false;
        }
        opening_tag(parent)
            .and_then(|tag| tag.child_by_field_name("name"))
            .is_some_and(|name| self.parsed.node_text(name) == self.tagger.wrapper_name())
    }
}

/// The node holding an element's name and attributes.
fn opening_tag(element: Node<'_>) -> Option<Node<'_>> {
    match element.kind() {
        "jsx_self_closing_element" => Some(element),
        "jsx_element" => element.child_by_field_name("open_tag").or_else(|| {
            let mut cursor = element.walk();
            let found = element
                .named_children(&mut cursor)
                .find(|c| c.kind() == "jsx_opening_element");
            found
        }),
        _ => None,
    }
}

/// Plain lowercase identifiers are host (DOM) elements; components, member
/// expressions and namespaced names are not.
fn is_host_element(name: Node<'_>, text: &str) -> bool {
    name.kind() == "identifier" && text.chars().next().is_some_and(|c| c.is_ascii_lowercase())
}

fn attribute_names<'s>(parsed: &ParsedSource<'s>, tag: Node<'_>) -> Vec<&'s str> {
    let mut cursor = tag.walk();
    let names = tag
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "jsx_attribute")
        .filter_map(|attr| attr.named_child(0))
        .map(|name| parsed.node_text(name))
        .collect();
    names
}
