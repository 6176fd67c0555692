//! Error types for document decomposition.

use objsearch_types::PathError;
use thiserror::Error;

/// Errors raised while walking a source document.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The JSON token stream is malformed
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed input from a non-JSON token source
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// A rule path could not be parsed
    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    /// Reading the document failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: ParseError = json_err.into();
        assert!(matches!(err, ParseError::Json(_)));
        assert!(err.to_string().starts_with("JSON parse error:"));
    }
}
