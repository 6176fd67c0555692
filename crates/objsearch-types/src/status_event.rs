//! Status events: change notifications emitted by a storage system.
//!
//! A [`StatusEvent`] is immutable. Once persisted it becomes a
//! [`StoredStatusEvent`] with an id and a [`ProcessingState`], which is the
//! only field that changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GuidError;
use crate::guid::Guid;

/// Kind of change a status event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEventType {
    /// A new version of one object
    NewVersion,
    /// Every version of an object should be (re)indexed
    NewAllVersions,
    /// A whole access group was copied
    CopyAccessGroup,
    /// Object renamed; applies to all versions
    RenameAllVersions,
    /// Object deleted
    DeleteAllVersions,
    /// Object restored
    UndeleteAllVersions,
    /// Object became publicly readable
    PublishAllVersions,
    /// Object no longer publicly readable
    UnpublishAllVersions,
    /// Object shared into another access group
    Shared,
    /// Object unshared from an access group
    Unshared,
}

impl StatusEventType {
    /// Events that stand for several concrete events and must be expanded.
    pub fn is_expandable(&self) -> bool {
        matches!(
            self,
            StatusEventType::NewAllVersions | StatusEventType::CopyAccessGroup
        )
    }
}

impl fmt::Display for StatusEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusEventType::NewVersion => "new_version",
            StatusEventType::NewAllVersions => "new_all_versions",
            StatusEventType::CopyAccessGroup => "copy_access_group",
            StatusEventType::RenameAllVersions => "rename_all_versions",
            StatusEventType::DeleteAllVersions => "delete_all_versions",
            StatusEventType::UndeleteAllVersions => "undelete_all_versions",
            StatusEventType::PublishAllVersions => "publish_all_versions",
            StatusEventType::UnpublishAllVersions => "unpublish_all_versions",
            StatusEventType::Shared => "shared",
            StatusEventType::Unshared => "unshared",
        };
        write!(f, "{}", name)
    }
}

/// Processing state of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Waiting to be processed
    Unprocessed,
    /// Claimed by a worker
    Processing,
    /// Processed and written to the index
    Indexed,
    /// Processed, nothing to index
    Unindexed,
    /// Processing failed
    Failed,
}

impl ProcessingState {
    /// Everything except `Unprocessed` has left the backlog.
    pub fn is_processed(&self) -> bool {
        !matches!(self, ProcessingState::Unprocessed)
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingState::Unprocessed => write!(f, "unprocessed"),
            ProcessingState::Processing => write!(f, "processing"),
            ProcessingState::Indexed => write!(f, "indexed"),
            ProcessingState::Unindexed => write!(f, "unindexed"),
            ProcessingState::Failed => write!(f, "failed"),
        }
    }
}

/// A change notification from a storage system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Code of the storage system that emitted the event (e.g. "WS")
    pub storage_code: String,

    /// Access group the object lives in
    #[serde(default)]
    pub access_group_id: Option<i32>,

    /// Object id within the access group
    #[serde(default)]
    pub access_group_object_id: Option<String>,

    /// Object version
    #[serde(default)]
    pub version: Option<i32>,

    /// New object name, for renames
    #[serde(default)]
    pub new_name: Option<String>,

    /// Storage-specific object type, used to pick parsing rules
    #[serde(default)]
    pub storage_object_type: Option<String>,

    /// What happened
    pub event_type: StatusEventType,

    /// Public flag at the time of the event
    #[serde(default)]
    pub is_public: Option<bool>,

    /// When the change happened in the storage system
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Start building an event.
    pub fn builder(
        storage_code: impl Into<String>,
        event_type: StatusEventType,
        timestamp: DateTime<Utc>,
    ) -> StatusEventBuilder {
        StatusEventBuilder {
            event: StatusEvent {
                storage_code: storage_code.into(),
                access_group_id: None,
                access_group_object_id: None,
                version: None,
                new_name: None,
                storage_object_type: None,
                event_type,
                is_public: None,
                timestamp,
            },
        }
    }

    /// GUID of the object this event is about, if it names one.
    pub fn to_guid(&self) -> Result<Option<Guid>, GuidError> {
        match &self.access_group_object_id {
            Some(object_id) => Guid::object(
                self.storage_code.clone(),
                self.access_group_id,
                object_id.clone(),
                self.version,
            )
            .map(Some),
            None => Ok(None),
        }
    }

    /// Get timestamp as milliseconds since Unix epoch
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Builder for [`StatusEvent`].
#[derive(Debug, Clone)]
pub struct StatusEventBuilder {
    event: StatusEvent,
}

impl StatusEventBuilder {
    pub fn with_access_group(mut self, access_group_id: i32) -> Self {
        self.event.access_group_id = Some(access_group_id);
        self
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.event.access_group_object_id = Some(object_id.into());
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.event.version = Some(version);
        self
    }

    pub fn with_new_name(mut self, new_name: impl Into<String>) -> Self {
        self.event.new_name = Some(new_name.into());
        self
    }

    pub fn with_storage_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.event.storage_object_type = Some(object_type.into());
        self
    }

    pub fn with_public(mut self, is_public: bool) -> Self {
        self.event.is_public = Some(is_public);
        self
    }

    pub fn build(self) -> StatusEvent {
        self.event
    }
}

/// Persistence-assigned event id (ULID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusEventId(String);

impl StatusEventId {
    /// Fresh id.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A status event as held by an event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStatusEvent {
    pub id: StatusEventId,
    pub event: StatusEvent,
    pub state: ProcessingState,
    /// Last state change (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl StoredStatusEvent {
    /// Wrap a freshly stored event.
    pub fn new(id: StatusEventId, event: StatusEvent) -> Self {
        Self {
            id,
            event,
            state: ProcessingState::Unprocessed,
            updated_at: Utc::now(),
        }
    }

    /// Copy with a new processing state.
    pub fn with_state(&self, state: ProcessingState) -> Self {
        Self {
            state,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
