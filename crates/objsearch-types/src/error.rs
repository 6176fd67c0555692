//! Error types for the shared objsearch domain types.

use thiserror::Error;

/// Errors raised while parsing or constructing a [`crate::Guid`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidError {
    /// No `:` separating the storage code from the body
    #[error("GUID {0:?} is missing the storage code separator ':'")]
    MissingStorageCode(String),

    /// Storage code present but empty
    #[error("GUID {0:?} has an empty storage code")]
    EmptyStorageCode(String),

    /// Object id missing or empty
    #[error("GUID {0:?} has an empty object id")]
    EmptyObjectId(String),

    /// More than three `/`-separated segments in the object portion
    #[error("GUID {0:?} has too many '/' separated segments")]
    TooManySegments(String),

    /// A `:` or `/` with nothing on one side
    #[error("GUID {0:?} has a dangling separator")]
    DanglingSeparator(String),

    /// Access group id or version is not a number
    #[error("GUID {guid:?}: {field} {value:?} is not a valid number")]
    InvalidNumber {
        guid: String,
        field: &'static str,
        value: String,
    },

    /// Negative version
    #[error("GUID version must be >= 0, got {0}")]
    NegativeVersion(i32),

    /// Sub-object type without id or the reverse
    #[error("GUID sub-object type and id must both be present or both be absent")]
    IncompleteSubObject,

    /// A field holds a character the text form uses as a separator
    #[error("GUID {field} {value:?} must not contain {separator:?}")]
    ReservedSeparator {
        field: &'static str,
        value: String,
        separator: char,
    },
}

/// Errors raised while parsing an [`crate::ObjectJsonPath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// `~` followed by something other than `0` or `1`
    #[error("invalid escape sequence in path {path:?} at segment {segment:?}")]
    InvalidEscape { path: String, segment: String },

    /// `a//b`
    #[error("empty segment in path {0:?}")]
    EmptySegment(String),
}

/// Errors raised while loading parsing rules.
#[derive(Debug, Error)]
pub enum RulesError {
    /// JSON decoding failure
    #[error("Invalid parsing rules: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid but semantically wrong rules
    #[error("Invalid parsing rules for {object_type}: {message}")]
    Invalid {
        object_type: String,
        message: String,
    },
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Layered config could not be built or deserialized
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// Values loaded but out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
