//! End-to-end test infrastructure for objsearch.
//!
//! Provides a shared [`TestHarness`] with a RocksDB event store, a fixture
//! storage-system client ([`FixtureHandler`]) and an in-memory search backend
//! ([`RecordingIndexingStorage`]) so scenarios can drive the real worker
//! from stored events to indexed documents.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use objsearch_indexing::{
    ErrorType, EventHandler, IndexObjectRequest, IndexedObject, IndexerWorker, IndexingError,
    IndexingStorage, ParsingRulesRegistry, ResolvedReference, Retrier, TracingRetryLogger,
    WorkerConfig,
};
use objsearch_storage::{RocksStatusEventStorage, StatusEventStorage};
use objsearch_types::{
    Guid, ObjectTypeParsingRules, SourceData, SourceMetadata, SourcePayload, StatusEvent,
    StatusEventType, StoredStatusEvent,
};

/// Storage code served by [`FixtureHandler`].
pub const STORAGE_CODE: &str = "WS";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Event store
    pub store: Arc<RocksStatusEventStorage>,
    /// Scratch directory handed to the worker
    pub scratch_dir: PathBuf,
    pub handler: Arc<FixtureHandler>,
    pub indexing: Arc<RecordingIndexingStorage>,
}

impl TestHarness {
    /// Create a new harness with temp directory and RocksDB store.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            RocksStatusEventStorage::open(&temp_dir.path().join("events"))
                .expect("Failed to open event store"),
        );
        let scratch_dir = temp_dir.path().join("scratch");

        Self {
            _temp_dir: temp_dir,
            store,
            scratch_dir,
            handler: Arc::new(FixtureHandler::new()),
            indexing: Arc::new(RecordingIndexingStorage::new()),
        }
    }

    /// Persist events in order.
    pub fn ingest(&self, events: Vec<StatusEvent>) -> Vec<StoredStatusEvent> {
        events
            .into_iter()
            .map(|e| self.store.store(e).expect("Failed to store event"))
            .collect()
    }

    /// Worker over this harness with short retry delays.
    pub fn worker(&self, rules: ParsingRulesRegistry, config: WorkerConfig) -> IndexerWorker {
        IndexerWorker::new(
            self.store.clone(),
            vec![self.handler.clone() as Arc<dyn EventHandler>],
            self.indexing.clone(),
            Arc::new(rules),
            fast_retrier(),
            self.scratch_dir.clone(),
            config,
        )
    }

    pub fn unprocessed(&self) -> u64 {
        self.store
            .count(Some(STORAGE_CODE), false)
            .expect("Failed to count events")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Retrier with millisecond delays and a two-step fatal schedule.
pub fn fast_retrier() -> Retrier {
    Retrier::new(
        3,
        Duration::from_millis(1),
        vec![Duration::from_millis(1), Duration::from_millis(2)],
        Arc::new(TracingRetryLogger),
    )
    .expect("Failed to build retrier")
}

/// Registry from rule JSON documents.
pub fn rules_registry(documents: &[&str]) -> anyhow::Result<ParsingRulesRegistry> {
    let mut registry = ParsingRulesRegistry::new();
    for document in documents {
        registry.register(ObjectTypeParsingRules::from_json(document)?)?;
    }
    Ok(registry)
}

/// A `NewVersion` event for `access_group/object_id/version`.
pub fn new_version_event(
    access_group: i32,
    object_id: &str,
    version: i32,
    storage_object_type: &str,
    ts_ms: i64,
) -> StatusEvent {
    StatusEvent::builder(STORAGE_CODE, StatusEventType::NewVersion, timestamp(ts_ms))
        .with_access_group(access_group)
        .with_object_id(object_id)
        .with_version(version)
        .with_storage_object_type(storage_object_type)
        .build()
}

/// An object-level event without version.
pub fn object_event(
    event_type: StatusEventType,
    access_group: i32,
    object_id: &str,
    ts_ms: i64,
) -> StatusEvent {
    StatusEvent::builder(STORAGE_CODE, event_type, timestamp(ts_ms))
        .with_access_group(access_group)
        .with_object_id(object_id)
        .build()
}

pub fn timestamp(ts_ms: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ts_ms).unwrap()
}

pub fn guid(text: &str) -> Guid {
    Guid::parse(text).expect("Invalid GUID")
}

/// Failure injected into the next [`FixtureHandler::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Timeout-like, retried with the flat delay
    Transient,
    /// Escalating retries, then halts the worker
    FatalRetriable,
    /// Halts the worker at once
    Fatal,
}

impl InjectedFailure {
    fn to_error(self) -> IndexingError {
        match self {
            InjectedFailure::Transient => IndexingError::retriable("fixture timeout"),
            InjectedFailure::FatalRetriable => {
                IndexingError::fatal_retriable(ErrorType::Other, "fixture backend down")
            }
            InjectedFailure::Fatal => IndexingError::fatal("fixture crashed"),
        }
    }
}

#[derive(Debug, Clone)]
struct FixtureObject {
    storage_object_type: String,
    name: String,
    is_public: bool,
    json: Value,
}

/// In-memory storage system serving JSON documents by GUID.
#[derive(Default)]
pub struct FixtureHandler {
    objects: Mutex<BTreeMap<Guid, FixtureObject>>,
    failures: Mutex<VecDeque<InjectedFailure>>,
    loads: AtomicUsize,
}

impl FixtureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `json` for the versioned object `guid`.
    pub fn put_object(&self, guid: Guid, storage_object_type: &str, name: &str, json: Value) {
        self.objects.lock().unwrap().insert(
            guid,
            FixtureObject {
                storage_object_type: storage_object_type.to_string(),
                name: name.to_string(),
                is_public: false,
                json,
            },
        );
    }

    /// Make the next loads fail, in order.
    pub fn fail_next_loads(&self, failures: &[InjectedFailure]) {
        self.failures.lock().unwrap().extend(failures.iter().copied());
    }

    /// Number of `load` calls so far.
    pub fn load_calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn versions_matching(&self, event: &StatusEvent, same_object: bool) -> Vec<StatusEvent> {
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|(guid, _)| guid.access_group_id() == event.access_group_id)
            .filter(|(guid, _)| {
                !same_object || Some(guid.object_id()) == event.access_group_object_id.as_deref()
            })
            .map(|(guid, object)| {
                let mut builder = StatusEvent::builder(
                    STORAGE_CODE,
                    StatusEventType::NewVersion,
                    event.timestamp,
                )
                .with_object_id(guid.object_id())
                .with_storage_object_type(object.storage_object_type.clone());
                if let Some(group) = guid.access_group_id() {
                    builder = builder.with_access_group(group);
                }
                if let Some(version) = guid.version() {
                    builder = builder.with_version(version);
                }
                builder.build()
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for FixtureHandler {
    fn storage_code(&self) -> &str {
        STORAGE_CODE
    }

    async fn expand(&self, stored: &StoredStatusEvent) -> Result<Vec<StatusEvent>, IndexingError> {
        let event = &stored.event;
        match event.event_type {
            StatusEventType::NewAllVersions => Ok(self.versions_matching(event, true)),
            StatusEventType::CopyAccessGroup => Ok(self.versions_matching(event, false)),
            _ => Ok(vec![event.clone()]),
        }
    }

    async fn load(&self, guid_path: &[Guid], scratch: &Path) -> Result<SourceData, IndexingError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure.to_error());
        }

        let target = guid_path
            .last()
            .ok_or_else(|| IndexingError::Usage("empty GUID path".to_string()))?;
        let object = self
            .objects
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .ok_or_else(|| {
                IndexingError::non_retriable(
                    ErrorType::SourceObjectDeleted,
                    format!("{} is not in the fixture store", target),
                )
            })?;

        std::fs::write(scratch, serde_json::to_vec(&object.json)?)?;
        let metadata = SourceMetadata {
            name: object.name.clone(),
            creator: "fixture".to_string(),
            ..SourceMetadata::default()
        };
        Ok(SourceData::new(
            metadata,
            object.is_public,
            SourcePayload::File(scratch.to_path_buf()),
        ))
    }

    async fn build_reference_paths(
        &self,
        guid_path: &[Guid],
        references: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<Guid>>, IndexingError> {
        let mut paths = BTreeMap::new();
        for reference in references {
            let target = Guid::parse(&format!("{}:{}", STORAGE_CODE, reference))?;
            let mut path = guid_path.to_vec();
            path.push(target);
            paths.insert(reference.clone(), path);
        }
        Ok(paths)
    }

    async fn resolve_references(
        &self,
        paths: &BTreeMap<String, Vec<Guid>>,
    ) -> Result<Vec<ResolvedReference>, IndexingError> {
        let objects = self.objects.lock().unwrap();
        Ok(paths
            .iter()
            .filter_map(|(reference, path)| {
                let target = path.last()?;
                let object = objects.get(target)?;
                Some(ResolvedReference {
                    reference: reference.clone(),
                    guid: target.clone(),
                    storage_object_type: Some(object.storage_object_type.clone()),
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    object: IndexedObject,
    full_text: BTreeMap<String, Vec<String>>,
    access_groups: BTreeSet<i32>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct BackendState {
    documents: BTreeMap<Guid, IndexedDocument>,
    requests: Vec<IndexObjectRequest>,
}

/// In-memory search backend that records every request.
#[derive(Debug, Default)]
pub struct RecordingIndexingStorage {
    state: Mutex<BackendState>,
}

/// Version-agnostic identity of a document.
fn object_key(guid: &Guid) -> Guid {
    guid.without_sub_object().without_version()
}

impl RecordingIndexingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every index request received, in order.
    pub fn requests(&self) -> Vec<IndexObjectRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// GUIDs of all live documents.
    pub fn document_ids(&self) -> BTreeSet<Guid> {
        self.state
            .lock()
            .unwrap()
            .documents
            .iter()
            .filter(|(_, d)| !d.deleted)
            .map(|(g, _)| g.clone())
            .collect()
    }

    fn update_object<F>(&self, guid: &Guid, mut update: F)
    where
        F: FnMut(&mut IndexedDocument),
    {
        let key = object_key(guid);
        let mut state = self.state.lock().unwrap();
        for (id, document) in state.documents.iter_mut() {
            if object_key(id) == key {
                update(document);
            }
        }
    }
}

fn visible(document: &IndexedDocument, object_type: Option<&str>, access_groups: &BTreeSet<i32>) -> bool {
    !document.deleted
        && object_type.map_or(true, |t| document.object.object_type == t)
        && (document.object.is_public || !document.access_groups.is_disjoint(access_groups))
}

#[async_trait]
impl IndexingStorage for RecordingIndexingStorage {
    async fn index_object(&self, request: &IndexObjectRequest) -> Result<(), IndexingError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        let access_groups: BTreeSet<i32> = request.guid.access_group_id().into_iter().collect();
        for parsed in &request.objects {
            let document = IndexedDocument {
                object: IndexedObject {
                    guid: parsed.guid.clone(),
                    object_type: request.object_type.clone(),
                    name: request.name.clone(),
                    is_public: request.is_public,
                    json: parsed.json.clone(),
                    keywords: parsed.keywords.clone(),
                },
                full_text: parsed.full_text.clone(),
                access_groups: access_groups.clone(),
                deleted: false,
            };
            state.documents.insert(parsed.guid.clone(), document);
        }
        Ok(())
    }

    async fn share_objects(
        &self,
        guids: &BTreeSet<Guid>,
        access_group: i32,
        is_public: bool,
    ) -> Result<(), IndexingError> {
        for guid in guids {
            self.update_object(guid, |d| {
                d.access_groups.insert(access_group);
                d.object.is_public |= is_public;
            });
        }
        Ok(())
    }

    async fn unshare_objects(
        &self,
        guids: &BTreeSet<Guid>,
        access_group: i32,
    ) -> Result<(), IndexingError> {
        for guid in guids {
            self.update_object(guid, |d| {
                d.access_groups.remove(&access_group);
            });
        }
        Ok(())
    }

    async fn delete_all_versions(&self, guid: &Guid) -> Result<(), IndexingError> {
        self.update_object(guid, |d| d.deleted = true);
        Ok(())
    }

    async fn undelete_all_versions(&self, guid: &Guid) -> Result<(), IndexingError> {
        self.update_object(guid, |d| d.deleted = false);
        Ok(())
    }

    async fn publish_all_versions(&self, guid: &Guid) -> Result<(), IndexingError> {
        self.update_object(guid, |d| d.object.is_public = true);
        Ok(())
    }

    async fn unpublish_all_versions(&self, guid: &Guid) -> Result<(), IndexingError> {
        self.update_object(guid, |d| d.object.is_public = false);
        Ok(())
    }

    async fn set_name_on_all_versions(&self, guid: &Guid, name: &str) -> Result<(), IndexingError> {
        self.update_object(guid, |d| d.object.name = name.to_string());
        Ok(())
    }

    async fn get_objects_by_ids(&self, guids: &BTreeSet<Guid>) -> Result<Vec<IndexedObject>, IndexingError> {
        let state = self.state.lock().unwrap();
        Ok(guids
            .iter()
            .filter_map(|g| state.documents.get(g))
            .filter(|d| !d.deleted)
            .map(|d| d.object.clone())
            .collect())
    }

    async fn search_ids_by_text(
        &self,
        object_type: Option<&str>,
        text: &str,
        access_groups: &BTreeSet<i32>,
    ) -> Result<BTreeSet<Guid>, IndexingError> {
        let needle = text.to_lowercase();
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .iter()
            .filter(|(_, d)| visible(d, object_type, access_groups))
            .filter(|(_, d)| {
                d.full_text
                    .values()
                    .flatten()
                    .any(|t| t.to_lowercase().contains(&needle))
            })
            .map(|(g, _)| g.clone())
            .collect())
    }

    async fn lookup_ids_by_key(
        &self,
        object_type: Option<&str>,
        key: &str,
        value: &Value,
        access_groups: &BTreeSet<i32>,
    ) -> Result<BTreeSet<Guid>, IndexingError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .iter()
            .filter(|(_, d)| visible(d, object_type, access_groups))
            .filter(|(_, d)| {
                d.object
                    .keywords
                    .get(key)
                    .map_or(false, |values| values.contains(value))
            })
            .map(|(g, _)| g.clone())
            .collect())
    }
}
