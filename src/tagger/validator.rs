use crate::pool::with_parser;
use crate::tagger::errors::TaggerError;
use crate::tagger::parser::SourceLanguage;

/// Check that instrumenting `original` into `tagged` introduced no syntax
/// errors.
///
/// Error positions shift with every insertion, so the check compares
/// ERROR/MISSING node counts rather than locations.
pub fn validate_tagged(
    filename: &str,
    original: &str,
    tagged: &str,
    language: SourceLanguage,
) -> Result<(), TaggerError> {
    let (before, after) = with_parser(language, |parser| {
        let before = parser.parse_with_source(original)?.error_count();
        let after = parser.parse_with_source(tagged)?.error_count();
        Ok::<_, TaggerError>((before, after))
    })??;

    if after > before {
        return Err(TaggerError::SyntaxError {
            filename: filename.to_string(),
            count: after - before,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_instrumentation() {
        let original = "const x = <div />;";
        let tagged = "const x = <div data-dev-id=\"0\" />;";
        assert!(validate_tagged("a.tsx", original, tagged, SourceLanguage::Tsx).is_ok());
    }

    #[test]
    fn rejects_broken_instrumentation() {
        let original = "const x = <div />;";
        let tagged = "const x = <div data-dev-id= />;";
        assert!(matches!(
            validate_tagged("a.tsx", original, tagged, SourceLanguage::Tsx),
            Err(TaggerError::SyntaxError { .. })
        ));
    }

    #[test]
    fn tolerates_preexisting_errors() {
        let original = "const x = <div className= />;";
        assert!(validate_tagged("a.jsx", original, original, SourceLanguage::JavaScript).is_ok());
    }
}
