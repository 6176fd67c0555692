//! Error taxonomy for the indexing pipeline.
//!
//! Every failure maps to an [`ErrorKind`] that decides how the retrier and
//! the worker loop react, and to an [`ErrorType`] naming what went wrong.

use std::fmt;

use objsearch_parse::ParseError;
use objsearch_storage::StorageError;
use objsearch_types::{GuidError, PathError, RulesError};
use thiserror::Error;

/// How a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient; retried with a flat delay
    Retriable,
    /// Serious but possibly recoverable; retried on an escalating schedule
    FatalRetriable,
    /// Stops the worker
    Fatal,
    /// Bad data for one event; the event is marked failed and skipped
    NonRetriable,
    /// Programming error in the caller
    Usage,
    /// Cancellation was requested
    Interrupted,
}

/// What went wrong, for classification in logs and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    LocationDataMissing,
    SubObjectCountExceeded,
    IndexingConflict,
    SourceObjectDeleted,
    GuidNotFound,
    Other,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::LocationDataMissing => "location data missing",
            ErrorType::SubObjectCountExceeded => "sub-object count exceeded",
            ErrorType::IndexingConflict => "indexing conflict",
            ErrorType::SourceObjectDeleted => "source object deleted",
            ErrorType::GuidNotFound => "GUID not found",
            ErrorType::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while indexing
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Transient failure, e.g. a timeout talking to a collaborator
    #[error("Retriable error ({error_type}): {message}")]
    Retriable {
        error_type: ErrorType,
        message: String,
    },

    /// Failure worth a few slow retries before giving up on the worker
    #[error("Fatal retriable error ({error_type}): {message}")]
    FatalRetriable {
        error_type: ErrorType,
        message: String,
    },

    /// Failure that must stop the worker
    #[error("Fatal error ({error_type}): {message}")]
    Fatal {
        error_type: ErrorType,
        message: String,
    },

    /// The event cannot be indexed as it stands
    #[error("Indexing error ({error_type}): {message}")]
    NonRetriable {
        error_type: ErrorType,
        message: String,
    },

    /// API misuse
    #[error("Usage error: {0}")]
    Usage(String),

    /// `next()` called on an exhausted queue
    #[error("No more elements in the status event queue")]
    NoMoreElements,

    /// Cancelled while waiting
    #[error("Interrupted")]
    Interrupted,

    /// Event store failure
    #[error("Event store error: {0}")]
    Storage(#[from] StorageError),

    /// Source document could not be decomposed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("GUID error: {0}")]
    Guid(#[from] GuidError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Parsing rules error: {0}")]
    Rules(#[from] RulesError),

    /// Scratch file handling failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexingError {
    pub fn retriable(message: impl Into<String>) -> Self {
        IndexingError::Retriable {
            error_type: ErrorType::Other,
            message: message.into(),
        }
    }

    pub fn fatal_retriable(error_type: ErrorType, message: impl Into<String>) -> Self {
        IndexingError::FatalRetriable {
            error_type,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        IndexingError::Fatal {
            error_type: ErrorType::Other,
            message: message.into(),
        }
    }

    pub fn non_retriable(error_type: ErrorType, message: impl Into<String>) -> Self {
        IndexingError::NonRetriable {
            error_type,
            message: message.into(),
        }
    }

    /// Handling class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexingError::Retriable { .. } => ErrorKind::Retriable,
            IndexingError::FatalRetriable { .. } => ErrorKind::FatalRetriable,
            IndexingError::Fatal { .. } => ErrorKind::Fatal,
            IndexingError::NonRetriable { .. } => ErrorKind::NonRetriable,
            IndexingError::Usage(_) | IndexingError::NoMoreElements => ErrorKind::Usage,
            IndexingError::Interrupted => ErrorKind::Interrupted,
            IndexingError::Storage(_) => ErrorKind::Fatal,
            IndexingError::Parse(ParseError::Io(_)) | IndexingError::Io(_) => ErrorKind::Retriable,
            IndexingError::Parse(_)
            | IndexingError::Guid(_)
            | IndexingError::Path(_)
            | IndexingError::Rules(_)
            | IndexingError::Json(_) => ErrorKind::NonRetriable,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            IndexingError::Retriable { error_type, .. }
            | IndexingError::FatalRetriable { error_type, .. }
            | IndexingError::Fatal { error_type, .. }
            | IndexingError::NonRetriable { error_type, .. } => *error_type,
            _ => ErrorType::Other,
        }
    }

    /// True when the worker loop must stop on this error.
    pub fn halts_worker(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Retriable | ErrorKind::NonRetriable)
    }
}
