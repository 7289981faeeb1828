use crate::tagger::errors::TaggerError;
use ast_grep_language::{LanguageExt, SupportLang};
use std::path::Path;
use tree_sitter::{Parser, Tree};

/// JSX-capable grammar to parse a file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceLanguage {
    /// JavaScript with JSX (`.js`, `.jsx`, `.mjs`)
    JavaScript,
    /// TypeScript with JSX (`.tsx`)
    #[default]
    Tsx,
}

impl SourceLanguage {
    /// Pick the grammar from a file extension. `.ts` has no JSX and is not
    /// taggable.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "js" | "jsx" | "mjs" => Some(SourceLanguage::JavaScript),
            "tsx" => Some(SourceLanguage::Tsx),
            _ => None,
        }
    }

    fn support_lang(self) -> SupportLang {
        match self {
            SourceLanguage::JavaScript => SupportLang::JavaScript,
            SourceLanguage::Tsx => SupportLang::Tsx,
        }
    }
}

/// Tree-sitter parser wrapper for JSX source.
pub struct JsxParser {
    parser: Parser,
    language: SourceLanguage,
}

impl JsxParser {
    pub fn new(language: SourceLanguage) -> Result<Self, TaggerError> {
        let mut parser = Parser::new();
        // Get the tree-sitter Language from ast-grep-language
        let ts_lang = language.support_lang().get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| TaggerError::LanguageSet)?;

        Ok(Self { parser, language })
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    pub fn parse(&mut self, source: &str) -> Result<Tree, TaggerError> {
        self.parser
            .parse(source, None)
            .ok_or(TaggerError::ParseFailed)
    }

    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TaggerError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Number of ERROR and MISSING nodes in the tree.
    pub fn error_count(&self) -> usize {
        count_error_nodes(self.tree.root_node())
    }

    pub fn node_text(&self, node: tree_sitter::Node<'_>) -> &'a str {
        &self.source[node.byte_range()]
    }
}

fn count_error_nodes(node: tree_sitter::Node<'_>) -> usize {
    let own = usize::from(node.is_error() || node.is_missing());
    if !node.has_error() {
        return own;
    }

    let mut cursor = node.walk();
    own + node
        .children(&mut cursor)
        .map(count_error_nodes)
        .sum::<usize>()
}
