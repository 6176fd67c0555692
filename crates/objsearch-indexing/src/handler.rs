//! Contract of a storage-system client.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexingError;
use objsearch_types::{Guid, SourceData, StatusEvent, StoredStatusEvent};

/// A reference string resolved to the object it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    /// Reference as it appeared in the source document
    pub reference: String,
    /// Object the reference resolves to
    pub guid: Guid,
    /// Storage-specific type of the target, when known
    #[serde(default)]
    pub storage_object_type: Option<String>,
}

/// Client for one storage system, selected by storage code.
///
/// Errors should use the [`IndexingError`] classes so the retrier can tell
/// timeouts from missing objects.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Code of the storage system this handler serves.
    fn storage_code(&self) -> &str;

    /// Turn an aggregate event into concrete per-object events.
    ///
    /// Returning the event unchanged is allowed.
    async fn expand(&self, event: &StoredStatusEvent) -> Result<Vec<StatusEvent>, IndexingError>;

    /// Fetch an object. `guid_path` runs from an accessible object to the
    /// target; large payloads are written to `scratch`.
    async fn load(&self, guid_path: &[Guid], scratch: &Path) -> Result<SourceData, IndexingError>;

    /// Access path for every reference found in the object at `guid_path`.
    async fn build_reference_paths(
        &self,
        guid_path: &[Guid],
        references: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<Guid>>, IndexingError>;

    /// Resolve references along the paths from [`Self::build_reference_paths`].
    async fn resolve_references(
        &self,
        paths: &BTreeMap<String, Vec<Guid>>,
    ) -> Result<Vec<ResolvedReference>, IndexingError>;
}
