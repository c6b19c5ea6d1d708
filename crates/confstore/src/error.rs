//! Error taxonomy and location-aware parse diagnostics.
//!
//! Every failure a caller can see is one of three origins: resolution failed
//! (`NotFound`), the filesystem refused (`Io`), or the bytes did not parse
//! (`Parse`). Parse failures carry a uniform set of fields regardless of
//! which format engine rejected the input.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Classification attached to a parse failure when the underlying parser
/// exposes one. Absent for JSON failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// YAML-family syntax error.
    UnexpectedToken,
    /// Strict key-uniqueness violation.
    DuplicateKey,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::UnexpectedToken => "UNEXPECTED_TOKEN",
            ErrorCode::DuplicateKey => "DUPLICATE_KEY",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parser failure not yet attached to a file. Produced by the format layer
/// and by [`crate::parse`]; the pipeline wraps it into a [`ParseError`] once
/// the resolved path is known.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code: Option<ErrorCode>,
    /// Up to two source lines ending at the offending one, plus a caret line.
    pub snippet: Option<String>,
}

impl Diagnostic {
    pub(crate) fn json(err: &serde_json::Error, source: &str) -> Self {
        let located = err.line() > 0;
        let line = located.then(|| err.line());
        let column = located.then(|| err.column().max(1));
        Diagnostic {
            message: err.to_string(),
            line,
            column,
            code: None,
            snippet: line
                .zip(column)
                .map(|(l, c)| context_snippet(source, l, c)),
        }
    }

    pub(crate) fn yaml(err: &serde_yaml::Error, source: &str) -> Self {
        let location = err.location();
        let line = location.as_ref().map(|l| l.line());
        let column = location.as_ref().map(|l| l.column());
        Diagnostic {
            message: err.to_string(),
            line,
            column,
            code: Some(ErrorCode::UnexpectedToken),
            snippet: line
                .zip(column)
                .map(|(l, c)| context_snippet(source, l, c)),
        }
    }

    /// The fixed strict-uniqueness failure, located at the second occurrence
    /// of the key.
    pub(crate) fn duplicate_key(source: &str, line: usize, column: usize) -> Self {
        let snippet = context_snippet(source, line, column);
        Diagnostic {
            message: format!(
                "Map keys must be unique at line {line}, column {column}:\n\n{snippet}\n"
            ),
            line: Some(line),
            column: Some(column),
            code: Some(ErrorCode::DuplicateKey),
            snippet: Some(snippet),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Render the offending line with up to one line of leading context and a
/// caret under `column` (1-based).
pub(crate) fn context_snippet(source: &str, line: usize, column: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line = line.clamp(1, lines.len().max(1));
    let first = line.saturating_sub(2);
    let mut out = lines
        .get(first..line)
        .unwrap_or_default()
        .join("\n");
    out.push('\n');
    out.push_str(&" ".repeat(column.saturating_sub(1)));
    out.push('^');
    out
}

/// A parse failure attached to the file it came from.
///
/// `filename` always equals `path`; both fields exist for compatibility with
/// callers that expect either name.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub path: PathBuf,
    pub filename: PathBuf,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code: Option<ErrorCode>,
    pub snippet: Option<String>,
}

impl ParseError {
    pub fn new(path: &Path, diagnostic: Diagnostic) -> Self {
        ParseError {
            message: diagnostic.message,
            path: path.to_path_buf(),
            filename: path.to_path_buf(),
            line: diagnostic.line,
            column: diagnostic.column,
            code: diagnostic.code,
            snippet: diagnostic.snippet,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ParseError {}

/// Everything the read/write pipeline can fail with.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resolution failed; carries the path as the caller requested it.
    #[error("object file not found: {path}")]
    NotFound { path: PathBuf },

    /// Filesystem failure other than not-found during resolution.
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}
