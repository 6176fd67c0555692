//! # objsearch-types
//!
//! Shared domain types for the objsearch indexer.
//!
//! - [`Guid`]: identifiers for objects and sub-objects in a storage system
//! - [`ObjectJsonPath`]: escaped JSON paths with `*` / `[*]` wildcards
//! - [`StatusEvent`] / [`StoredStatusEvent`]: change notifications and their processing state
//! - [`ObjectTypeParsingRules`]: how an object type is decomposed and indexed
//! - [`SourceData`]: a loaded source object
//! - [`Settings`]: layered configuration

pub mod config;
pub mod error;
pub mod guid;
pub mod path;
pub mod rules;
pub mod source;
pub mod status_event;

pub use config::{Settings, WorkerSettings};
pub use error::{ConfigError, GuidError, PathError, RulesError};
pub use guid::Guid;
pub use path::{is_wildcard, ObjectJsonPath, ARRAY_WILDCARD, MAP_WILDCARD};
pub use rules::{ForeignKeyRule, IndexingRule, ObjectTypeParsingRules, SubObjectRule};
pub use source::{SourceData, SourceMetadata, SourcePayload};
pub use status_event::{
    ProcessingState, StatusEvent, StatusEventBuilder, StatusEventId, StatusEventType,
    StoredStatusEvent,
};
