use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaggerError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("no JSX grammar for {path}")]
    UnsupportedFile { path: PathBuf },

    #[error("tagging introduced {count} syntax error(s) in {filename}")]
    SyntaxError { filename: String, count: usize },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
