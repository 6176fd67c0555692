//! RocksDB-backed status event store.
//!
//! Events live in one column family, keyed `sev:{timestamp_ms}:{ulid}`
//! with JSON values, so a forward scan yields them in delivery order.
//! Unprocessed events are also indexed under the same key in the backlog
//! column family, so cursors over pending work never touch processed
//! history. Every write that changes the backlog is one atomic batch.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_BACKLOG, CF_META, CF_STATUS_EVENTS,
};
use crate::error::StorageError;
use crate::keys::StatusEventKey;
use crate::store::{EventFilter, StatusEventStorage};
use objsearch_types::{ProcessingState, StatusEvent, StatusEventId, StoredStatusEvent};

/// Meta key holding the next insertion sequence, big-endian u64
const SEQUENCE_KEY: &[u8] = b"event_sequence";

/// Status event store on a RocksDB instance.
pub struct RocksStatusEventStorage {
    db: DB,
    /// Next insertion sequence, held until the batch persisting it lands
    sequence: Mutex<u64>,
}

impl RocksStatusEventStorage {
    /// Open the store at `path`, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening status event store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        let sequence = Self::load_sequence(&db)?;
        debug!(sequence, "Loaded status event sequence");
        Ok(Self {
            db,
            sequence: Mutex::new(sequence),
        })
    }

    fn load_sequence(db: &DB) -> Result<u64, StorageError> {
        let cf = db
            .cf_handle(CF_META)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_META.to_string()))?;
        match db.get_cf(cf, SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Key(format!("Invalid event sequence of {} bytes", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn sequence(&self) -> Result<MutexGuard<'_, u64>, StorageError> {
        self.sequence
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Visit raw entries of `cf_name` in key order until `visit` returns false.
    fn scan<F>(&self, cf_name: &str, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, StorageError>,
    {
        let cf = self.cf(cf_name)?;
        let start = StatusEventKey::scan_start();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !visit(&key, &value)? {
                break;
            }
        }
        Ok(())
    }

    /// Visit every stored event in key order until `visit` returns false.
    fn scan_events<F>(&self, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(StoredStatusEvent) -> bool,
    {
        self.scan(CF_STATUS_EVENTS, |_, value| {
            Ok(visit(StoredStatusEvent::from_bytes(value)?))
        })
    }

    /// Visit backlog keys whose storage code passes `filter`.
    fn scan_backlog<F>(&self, filter: &EventFilter, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(&[u8]) -> bool,
    {
        self.scan(CF_BACKLOG, |key, code| {
            let wanted = match &filter.storage_code {
                Some(wanted) => wanted.as_bytes() == code,
                None => true,
            };
            Ok(!wanted || visit(key))
        })
    }

    fn load_backlog_page(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredStatusEvent>, StorageError> {
        let mut skipped = 0u64;
        let mut keys: Vec<Vec<u8>> = Vec::with_capacity(limit);
        self.scan_backlog(filter, |key| {
            if skipped < offset {
                skipped += 1;
                return true;
            }
            keys.push(key.to_vec());
            keys.len() < limit
        })?;

        let cf = self.cf(CF_STATUS_EVENTS)?;
        let mut page = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self.db.get_cf(cf, &key)?.ok_or_else(|| {
                StorageError::NotFound(String::from_utf8_lossy(&key).into_owned())
            })?;
            page.push(StoredStatusEvent::from_bytes(&bytes)?);
        }
        Ok(page)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }
}

impl StatusEventStorage for RocksStatusEventStorage {
    fn store(&self, event: StatusEvent) -> Result<StoredStatusEvent, StorageError> {
        let mut next = self.sequence()?;
        let key = StatusEventKey::new(event.timestamp_ms(), *next);
        let stored = StoredStatusEvent::new(key.event_id(), event);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_STATUS_EVENTS)?, key.to_bytes(), stored.to_bytes()?);
        batch.put_cf(
            self.cf(CF_BACKLOG)?,
            key.to_bytes(),
            stored.event.storage_code.as_bytes(),
        );
        batch.put_cf(self.cf(CF_META)?, SEQUENCE_KEY, (*next + 1).to_be_bytes());
        self.db.write(batch)?;
        *next += 1;

        debug!(event_id = %stored.id, sequence = key.sequence(), "Stored status event");
        Ok(stored)
    }

    fn get(&self, id: &StatusEventId) -> Result<Option<StoredStatusEvent>, StorageError> {
        let key = StatusEventKey::from_event_id(id)?;
        let cf = self.cf(CF_STATUS_EVENTS)?;
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(StoredStatusEvent::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_page(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredStatusEvent>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if !filter.processed {
            return self.load_backlog_page(filter, offset, limit);
        }

        let mut skipped = 0u64;
        let mut page = Vec::with_capacity(limit);
        self.scan_events(|stored| {
            if !filter.matches(&stored) {
                return true;
            }
            if skipped < offset {
                skipped += 1;
                return true;
            }
            page.push(stored);
            page.len() < limit
        })?;
        Ok(page)
    }

    fn set_processing_state(
        &self,
        id: &StatusEventId,
        state: ProcessingState,
    ) -> Result<StoredStatusEvent, StorageError> {
        let key = StatusEventKey::from_event_id(id)?;
        let mut stored = self
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        stored.state = state;
        stored.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_STATUS_EVENTS)?, key.to_bytes(), stored.to_bytes()?);
        let backlog = self.cf(CF_BACKLOG)?;
        if state.is_processed() {
            batch.delete_cf(backlog, key.to_bytes());
        } else {
            batch.put_cf(backlog, key.to_bytes(), stored.event.storage_code.as_bytes());
        }
        self.db.write(batch)?;

        debug!(event_id = %id, state = %state, "Updated status event state");
        Ok(stored)
    }

    fn count(&self, storage_code: Option<&str>, processed: bool) -> Result<u64, StorageError> {
        let filter = EventFilter::new(storage_code, processed);
        let mut count = 0u64;
        if processed {
            self.scan_events(|stored| {
                if filter.matches(&stored) {
                    count += 1;
                }
                true
            })?;
        } else {
            self.scan_backlog(&filter, |_| {
                count += 1;
                true
            })?;
        }
        Ok(count)
    }

    fn find_access_groups(&self, storage_code: &str) -> Result<BTreeSet<i32>, StorageError> {
        let mut groups = BTreeSet::new();
        self.scan_events(|stored| {
            if stored.event.storage_code == storage_code {
                if let Some(group) = stored.event.access_group_id {
                    groups.insert(group);
                }
            }
            true
        })?;
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStatusEventStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksStatusEventStorage::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn backlog_len(store: &RocksStatusEventStorage) -> usize {
        let mut len = 0;
        store
            .scan(CF_BACKLOG, |_, _| {
                len += 1;
                Ok(true)
            })
            .unwrap();
        len
    }

    #[test]
    fn test_open_creates_column_families() {
        let (store, _dir) = create_test_store();
        for cf_name in ALL_CF_NAMES {
            assert!(store.db.cf_handle(cf_name).is_some(), "missing {}", cf_name);
        }
    }

    #[test]
    fn test_drain_smaller_pages() {
        let (store, _dir) = create_test_store();
        conformance::drains_backlog(&store, 10, 3);
    }

    #[test]
    fn test_drain_exact_page() {
        let (store, _dir) = create_test_store();
        conformance::drains_backlog(&store, 4, 4);
    }

    #[test]
    fn test_drain_larger_page() {
        let (store, _dir) = create_test_store();
        conformance::drains_backlog(&store, 3, 50);
    }

    #[test]
    fn test_unacknowledged_events_stay_pending() {
        let (store, _dir) = create_test_store();
        conformance::skips_unacknowledged(&store);
    }

    #[test]
    fn test_timestamp_order() {
        let (store, _dir) = create_test_store();
        conformance::orders_by_timestamp(&store);
    }

    #[test]
    fn test_same_timestamp_insertion_order() {
        let (store, _dir) = create_test_store();
        conformance::keeps_insertion_order_within_timestamp(&store);
    }

    #[test]
    fn test_filters_and_groups() {
        let (store, _dir) = create_test_store();
        conformance::filters_and_groups(&store);
    }

    #[test]
    fn test_cursor_expiry() {
        let (store, _dir) = create_test_store();
        conformance::expires_cursor(&store);
    }

    #[test]
    fn test_backlog_follows_processing_state() {
        let (store, _dir) = create_test_store();
        let first = store.store(conformance::event("WS", 1, 1)).unwrap();
        store.store(conformance::event("KE", 2, 1)).unwrap();
        store.store(conformance::event("WS", 3, 1)).unwrap();
        assert_eq!(backlog_len(&store), 3);

        store.mark_as_processed(&first, true).unwrap();
        assert_eq!(backlog_len(&store), 2);
        assert_eq!(store.count(Some("WS"), false).unwrap(), 1);
        assert_eq!(store.count(Some("WS"), true).unwrap(), 1);

        let page = store
            .load_page(&EventFilter::new(Some("WS"), false), 0, 10)
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].event.timestamp_ms(), 3);

        // requeued events rejoin the backlog
        store
            .set_processing_state(&first.id, ProcessingState::Unprocessed)
            .unwrap();
        assert_eq!(backlog_len(&store), 3);
        assert_eq!(store.count(Some("WS"), false).unwrap(), 2);
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let store = RocksStatusEventStorage::open(temp_dir.path()).unwrap();
            let stored = store.store(conformance::event("WS", 42, 5)).unwrap();
            store.store(conformance::event("WS", 43, 5)).unwrap();
            store.mark_as_processed(&stored, true).unwrap();
            store.flush().unwrap();
            stored.id
        };
        let store = RocksStatusEventStorage::open(temp_dir.path()).unwrap();
        let reloaded = store.get(&id).unwrap().unwrap();
        assert_eq!(reloaded.state, ProcessingState::Indexed);
        assert_eq!(reloaded.event.access_group_id, Some(5));
        assert_eq!(store.count(None, false).unwrap(), 1);
        assert_eq!(backlog_len(&store), 1);
    }

    #[test]
    fn test_sequence_continues_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = RocksStatusEventStorage::open(temp_dir.path()).unwrap();
            for _ in 0..3 {
                store.store(conformance::event("WS", 7_000, 1)).unwrap();
            }
        }
        let store = RocksStatusEventStorage::open(temp_dir.path()).unwrap();
        let later = store.store(conformance::event("WS", 7_000, 2)).unwrap();
        let key = StatusEventKey::from_event_id(&later.id).unwrap();
        assert_eq!(key.sequence(), 3);

        let cursor = store
            .cursor(Some("WS"), false, 10, Duration::from_secs(60))
            .unwrap();
        let groups: Vec<Option<i32>> = cursor.page().iter().map(|s| s.event.access_group_id).collect();
        assert_eq!(groups, vec![Some(1), Some(1), Some(1), Some(2)]);
    }
}
