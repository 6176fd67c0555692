//! The indexer worker: drains the status event queue into the search backend.
//!
//! Each pass opens a [`StatusEventQueue`] per storage code and handles events
//! in order. An event is acknowledged as indexed or unindexed on success,
//! marked failed on a per-event data error, and left unprocessed when the
//! worker has to stop.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decompose::ObjectDecomposer;
use crate::error::{ErrorType, IndexingError};
use crate::handler::EventHandler;
use crate::index_storage::{IndexObjectRequest, IndexingStorage};
use crate::queue::StatusEventQueue;
use crate::registry::ParsingRulesRegistry;
use crate::retrier::Retrier;
use objsearch_storage::{StatusEventStorage, StorageError};
use objsearch_types::{Guid, StatusEvent, StatusEventType, StoredStatusEvent, WorkerSettings};

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Events fetched per cursor page
    pub page_size: usize,
    /// Cursor time-to-live
    pub cursor_ttl: Duration,
    /// Upper bound on sub-objects per source object
    pub max_sub_objects: usize,
    /// Pause between passes in [`IndexerWorker::run`]
    pub poll_interval: Duration,
    /// Codes drained by [`IndexerWorker::run`]; empty means one queue over all codes
    pub storage_codes: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_settings(&WorkerSettings::default())
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            page_size: settings.page_size,
            cursor_ttl: Duration::from_secs(settings.cursor_ttl_secs),
            max_sub_objects: settings.max_sub_objects,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            storage_codes: settings.storage_codes.clone(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_sub_objects(mut self, max: usize) -> Self {
        self.max_sub_objects = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_storage_codes(mut self, codes: Vec<String>) -> Self {
        self.storage_codes = codes;
        self
    }
}

/// Outcome counts of one or more worker passes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerRunStats {
    /// Events acknowledged as indexed
    pub indexed: usize,
    /// Events acknowledged with nothing to index
    pub unindexed: usize,
    /// Events marked failed
    pub failed: usize,
}

impl WorkerRunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, indexed: bool) {
        if indexed {
            self.indexed += 1;
        } else {
            self.unindexed += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn merge(&mut self, other: &WorkerRunStats) {
        self.indexed += other.indexed;
        self.unindexed += other.unindexed;
        self.failed += other.failed;
    }

    /// Events acknowledged in any state.
    pub fn total(&self) -> usize {
        self.indexed + self.unindexed + self.failed
    }
}

/// Single-consumer indexer over one event store.
pub struct IndexerWorker {
    store: Arc<dyn StatusEventStorage>,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    indexing: Arc<dyn IndexingStorage>,
    rules: Arc<ParsingRulesRegistry>,
    retrier: Retrier,
    scratch_dir: PathBuf,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl IndexerWorker {
    /// Create a worker. Handlers are keyed by their storage code; a later
    /// handler for the same code replaces an earlier one.
    pub fn new(
        store: Arc<dyn StatusEventStorage>,
        handlers: Vec<Arc<dyn EventHandler>>,
        indexing: Arc<dyn IndexingStorage>,
        rules: Arc<ParsingRulesRegistry>,
        retrier: Retrier,
        scratch_dir: impl Into<PathBuf>,
        config: WorkerConfig,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|h| (h.storage_code().to_string(), h))
            .collect();
        Self {
            store,
            handlers,
            indexing,
            rules,
            retrier,
            scratch_dir: scratch_dir.into(),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop [`Self::run`] and any retry wait when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.retrier = self.retrier.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Poll every configured storage code until cancelled.
    ///
    /// An expired cursor ends the current pass; the next pass opens a new one.
    pub async fn run(&self) -> Result<WorkerRunStats, IndexingError> {
        let codes: Vec<Option<&str>> = if self.config.storage_codes.is_empty() {
            vec![None]
        } else {
            self.config.storage_codes.iter().map(|c| Some(c.as_str())).collect()
        };
        info!(
            storage_codes = ?self.config.storage_codes,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Indexer worker starting"
        );

        let mut total = WorkerRunStats::new();
        loop {
            for code in &codes {
                if self.cancel.is_cancelled() {
                    break;
                }
                match self.run_once(*code).await {
                    Ok(stats) => total.merge(&stats),
                    Err(IndexingError::Interrupted) => {
                        info!(total = total.total(), "Indexer worker interrupted");
                        return Ok(total);
                    }
                    Err(IndexingError::Storage(StorageError::CursorExpired(id))) => {
                        warn!(cursor_id = %id, storage_code = ?code, "Cursor expired, restarting pass");
                    }
                    Err(e) => return Err(e),
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(total = total.total(), "Indexer worker stopped");
                    return Ok(total);
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Drain the unprocessed events of `storage_code` (all codes when `None`).
    ///
    /// Returns early, without error, when cancellation is requested between
    /// events. A halting error is returned with the current event left
    /// unprocessed.
    pub async fn run_once(&self, storage_code: Option<&str>) -> Result<WorkerRunStats, IndexingError> {
        let mut queue = StatusEventQueue::new(
            self.store.clone(),
            storage_code,
            self.config.page_size,
            self.config.cursor_ttl,
        );
        let mut stats = WorkerRunStats::new();

        while !self.cancel.is_cancelled() && queue.has_next()? {
            let stored = queue.next()?;
            debug!(
                event_id = %stored.id,
                event_type = %stored.event.event_type,
                storage_code = %stored.event.storage_code,
                "Processing status event"
            );

            match self.process_event(&stored).await {
                Ok(indexed) => {
                    queue.mark_as_visited(indexed)?;
                    stats.record(indexed);
                }
                Err(e) if !e.halts_worker() => {
                    warn!(
                        event_id = %stored.id,
                        event_type = %stored.event.event_type,
                        error_type = %e.error_type(),
                        error = %e,
                        "Status event failed"
                    );
                    queue.mark_as_failed()?;
                    stats.record_failure();
                }
                Err(e) => {
                    error!(
                        event_id = %stored.id,
                        event_type = %stored.event.event_type,
                        error = %e,
                        "Halting indexer worker"
                    );
                    return Err(e);
                }
            }
        }

        if stats.total() > 0 {
            info!(
                storage_code = ?storage_code,
                indexed = stats.indexed,
                unindexed = stats.unindexed,
                failed = stats.failed,
                "Indexer pass complete"
            );
        }
        Ok(stats)
    }

    /// Handle one stored event; returns whether anything was indexed.
    async fn process_event(&self, stored: &StoredStatusEvent) -> Result<bool, IndexingError> {
        let handler = self
            .handlers
            .get(&stored.event.storage_code)
            .ok_or_else(|| {
                IndexingError::fatal(format!(
                    "no handler for storage code {}",
                    stored.event.storage_code
                ))
            })?
            .as_ref();

        let events = if stored.event.event_type.is_expandable() {
            self.retrier
                .retry_func(|_| handler.expand(stored), (), Some(stored))
                .await?
        } else {
            vec![stored.event.clone()]
        };
        if events.len() != 1 || events[0] != stored.event {
            debug!(event_id = %stored.id, expanded = events.len(), "Expanded status event");
        }

        let mut indexed = false;
        for event in events {
            let done = self
                .retrier
                .retry_func(
                    |event: StatusEvent| self.process_concrete(handler, event),
                    event,
                    Some(stored),
                )
                .await?;
            indexed |= done;
        }
        Ok(indexed)
    }

    async fn process_concrete(
        &self,
        handler: &dyn EventHandler,
        event: StatusEvent,
    ) -> Result<bool, IndexingError> {
        if event.event_type.is_expandable() {
            debug!(event_type = %event.event_type, "Skipping unexpanded aggregate event");
            return Ok(false);
        }
        let guid = event.to_guid()?.ok_or_else(|| {
            IndexingError::non_retriable(
                ErrorType::LocationDataMissing,
                format!("{} event has no object id", event.event_type),
            )
        })?;

        match event.event_type {
            StatusEventType::NewVersion => self.index_new_version(handler, &event, guid).await,
            StatusEventType::RenameAllVersions => {
                let name = event.new_name.as_deref().ok_or_else(|| {
                    IndexingError::non_retriable(
                        ErrorType::LocationDataMissing,
                        format!("rename of {} carries no new name", guid),
                    )
                })?;
                self.indexing
                    .set_name_on_all_versions(&guid.without_version(), name)
                    .await?;
                Ok(true)
            }
            StatusEventType::DeleteAllVersions => {
                self.indexing.delete_all_versions(&guid.without_version()).await?;
                Ok(true)
            }
            StatusEventType::UndeleteAllVersions => {
                self.indexing.undelete_all_versions(&guid.without_version()).await?;
                Ok(true)
            }
            StatusEventType::PublishAllVersions => {
                self.indexing.publish_all_versions(&guid.without_version()).await?;
                Ok(true)
            }
            StatusEventType::UnpublishAllVersions => {
                self.indexing.unpublish_all_versions(&guid.without_version()).await?;
                Ok(true)
            }
            StatusEventType::Shared | StatusEventType::Unshared => {
                let access_group = event.access_group_id.ok_or_else(|| {
                    IndexingError::non_retriable(
                        ErrorType::LocationDataMissing,
                        format!("{} event for {} has no access group", event.event_type, guid),
                    )
                })?;
                let guids = BTreeSet::from([guid.without_version()]);
                if event.event_type == StatusEventType::Shared {
                    self.indexing
                        .share_objects(&guids, access_group, event.is_public.unwrap_or(false))
                        .await?;
                } else {
                    self.indexing.unshare_objects(&guids, access_group).await?;
                }
                Ok(true)
            }
            StatusEventType::NewAllVersions | StatusEventType::CopyAccessGroup => Ok(false),
        }
    }

    async fn index_new_version(
        &self,
        handler: &dyn EventHandler,
        event: &StatusEvent,
        guid: Guid,
    ) -> Result<bool, IndexingError> {
        let object_type = event.storage_object_type.as_deref().ok_or_else(|| {
            IndexingError::non_retriable(
                ErrorType::LocationDataMissing,
                format!("{} has no storage object type", guid),
            )
        })?;
        let rule_sets = self.rules.rules_for(&event.storage_code, object_type);
        if rule_sets.is_empty() {
            debug!(guid = %guid, object_type, "No parsing rules for object type");
            return Ok(false);
        }

        // removed on drop
        let scratch = create_scratch_file(&self.scratch_dir).await?;
        let guid_path = vec![guid.clone()];
        let source = handler.load(&guid_path, scratch.path()).await?;

        let mut requests = Vec::with_capacity(rule_sets.len());
        let mut parent_json: Option<Value> = None;
        for rules in rule_sets {
            let decomposer = ObjectDecomposer::new(rules.clone(), self.config.max_sub_objects);
            let mut decomposition = decomposer.decompose(&guid, &source.data)?;

            let references = decomposition.reference_set();
            if !references.is_empty() {
                let paths = handler.build_reference_paths(&guid_path, &references).await?;
                let resolved = handler.resolve_references(&paths).await?;
                decomposition.apply_references(&resolved)?;
            }

            let is_sub_object = rules.sub_object.is_some();
            if !is_sub_object {
                parent_json = decomposition.objects.first().map(|o| o.json.clone());
            }
            requests.push(IndexObjectRequest {
                guid: guid.clone(),
                object_type: rules.global_object_type.clone(),
                name: source.name().to_string(),
                timestamp: event.timestamp,
                parent_json: if is_sub_object { parent_json.clone() } else { None },
                metadata: source.metadata.clone(),
                is_public: source.is_public,
                objects: decomposition.objects,
            });
        }

        let objects: usize = requests.iter().map(|r| r.objects.len()).sum();
        self.indexing.index_objects(&requests).await?;
        info!(guid = %guid, rule_sets = requests.len(), objects, "Indexed object version");
        Ok(true)
    }
}

/// Fresh scratch file under `dir`, creating the directory first.
async fn create_scratch_file(dir: &Path) -> Result<tempfile::NamedTempFile, IndexingError> {
    tokio::fs::create_dir_all(dir).await?;
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || tempfile::NamedTempFile::new_in(dir))
        .await
        .map_err(|e| IndexingError::fatal(format!("scratch file task failed: {}", e)))?
        .map_err(IndexingError::from)
}
