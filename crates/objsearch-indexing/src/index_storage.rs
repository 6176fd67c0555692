//! Contract of the search backend, plus the documents sent to it.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexingError;
use objsearch_types::{Guid, SourceMetadata};

/// One indexable (sub-)object produced by decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedObject {
    /// Object GUID, with sub-object part for sub-objects
    pub guid: Guid,
    /// Retained part of the source document
    pub json: Value,
    /// Keyword values by key name
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<Value>>,
    /// Full-text values by key name
    #[serde(default)]
    pub full_text: BTreeMap<String, Vec<String>>,
}

impl ParsedObject {
    pub fn new(guid: Guid, json: Value) -> Self {
        Self {
            guid,
            json,
            keywords: BTreeMap::new(),
            full_text: BTreeMap::new(),
        }
    }

    pub fn add_keyword(&mut self, key: impl Into<String>, value: Value) {
        self.keywords.entry(key.into()).or_default().push(value);
    }

    pub fn add_full_text(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.full_text.entry(key.into()).or_default().push(text.into());
    }
}

/// Everything indexed for one object version under one rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexObjectRequest {
    /// Object GUID with version, without sub-object part
    pub guid: Guid,
    /// Type name in the index
    pub object_type: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Retained parent document when `objects` are sub-objects
    #[serde(default)]
    pub parent_json: Option<Value>,
    pub metadata: SourceMetadata,
    pub is_public: bool,
    pub objects: Vec<ParsedObject>,
}

/// A document as returned by the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedObject {
    pub guid: Guid,
    pub object_type: String,
    pub name: String,
    pub is_public: bool,
    pub json: Value,
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<Value>>,
}

/// Client for the search backend.
#[async_trait]
pub trait IndexingStorage: Send + Sync {
    async fn index_object(&self, request: &IndexObjectRequest) -> Result<(), IndexingError>;

    /// Bulk form of [`Self::index_object`].
    async fn index_objects(&self, requests: &[IndexObjectRequest]) -> Result<(), IndexingError> {
        for request in requests {
            self.index_object(request).await?;
        }
        Ok(())
    }

    /// Make objects visible to `access_group` (and to everyone when public).
    async fn share_objects(
        &self,
        guids: &BTreeSet<Guid>,
        access_group: i32,
        is_public: bool,
    ) -> Result<(), IndexingError>;

    async fn unshare_objects(
        &self,
        guids: &BTreeSet<Guid>,
        access_group: i32,
    ) -> Result<(), IndexingError>;

    /// Version-agnostic operations take a GUID without version.
    async fn delete_all_versions(&self, guid: &Guid) -> Result<(), IndexingError>;

    async fn undelete_all_versions(&self, guid: &Guid) -> Result<(), IndexingError>;

    async fn publish_all_versions(&self, guid: &Guid) -> Result<(), IndexingError>;

    async fn unpublish_all_versions(&self, guid: &Guid) -> Result<(), IndexingError>;

    async fn set_name_on_all_versions(&self, guid: &Guid, name: &str) -> Result<(), IndexingError>;

    async fn get_objects_by_ids(&self, guids: &BTreeSet<Guid>) -> Result<Vec<IndexedObject>, IndexingError>;

    /// GUIDs of objects whose full text matches `text`.
    async fn search_ids_by_text(
        &self,
        object_type: Option<&str>,
        text: &str,
        access_groups: &BTreeSet<i32>,
    ) -> Result<BTreeSet<Guid>, IndexingError>;

    /// GUIDs of objects with keyword `key` equal to `value`.
    async fn lookup_ids_by_key(
        &self,
        object_type: Option<&str>,
        key: &str,
        value: &Value,
        access_groups: &BTreeSet<i32>,
    ) -> Result<BTreeSet<Guid>, IndexingError>;
}
