//! Thread-local parser pooling.
//!
//! A dev server re-tags every changed file on each rebuild; keeping one
//! parser per grammar per thread avoids re-creating them for every file.

use crate::tagger::{JsxParser, SourceLanguage, TaggerError};
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<SourceLanguage, JsxParser>> = RefCell::new(HashMap::new());
}

/// Execute `f` with the pooled parser for `language`.
///
/// The first call per thread and language creates the parser; later calls
/// reuse it.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use span_patcher::pool::with_parser;
/// use span_patcher::tagger::SourceLanguage;
///
/// let errors = with_parser(SourceLanguage::Tsx, |parser| {
///     parser.parse_with_source("<div />").map(|p| p.error_count())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(language: SourceLanguage, f: F) -> Result<R, TaggerError>
where
    F: FnOnce(&mut JsxParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(JsxParser::new(language)?)
            }
        };
        Ok(f(parser))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_parser_per_language() {
        let first = with_parser(SourceLanguage::Tsx, |p| p.language()).unwrap();
        let second = with_parser(SourceLanguage::JavaScript, |p| p.language()).unwrap();
        assert_eq!(first, SourceLanguage::Tsx);
        assert_eq!(second, SourceLanguage::JavaScript);

        let count = PARSERS.with(|cell| cell.borrow().len());
        assert_eq!(count, 2);
    }
}
