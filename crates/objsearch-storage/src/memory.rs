//! In-process status event store.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;

use crate::error::StorageError;
use crate::keys::StatusEventKey;
use crate::store::{EventFilter, StatusEventStorage};
use objsearch_types::{ProcessingState, StatusEvent, StatusEventId, StoredStatusEvent};

/// Events held in a `Vec` kept sorted by key.
#[derive(Debug, Default)]
pub struct MemoryStatusEventStorage {
    events: Mutex<Vec<(StatusEventKey, StoredStatusEvent)>>,
    sequence: AtomicU64,
}

impl MemoryStatusEventStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> Result<MutexGuard<'_, Vec<(StatusEventKey, StoredStatusEvent)>>, StorageError> {
        self.events
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }
}

impl StatusEventStorage for MemoryStatusEventStorage {
    fn store(&self, event: StatusEvent) -> Result<StoredStatusEvent, StorageError> {
        let mut events = self.events()?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let key = StatusEventKey::new(event.timestamp_ms(), sequence);
        let stored = StoredStatusEvent::new(key.event_id(), event);

        let at = events.partition_point(|(k, _)| *k < key);
        events.insert(at, (key, stored.clone()));
        debug!(event_id = %stored.id, "Stored status event");
        Ok(stored)
    }

    fn get(&self, id: &StatusEventId) -> Result<Option<StoredStatusEvent>, StorageError> {
        let key = StatusEventKey::from_event_id(id)?;
        let events = self.events()?;
        Ok(events
            .binary_search_by(|(k, _)| k.cmp(&key))
            .ok()
            .map(|i| events[i].1.clone()))
    }

    fn load_page(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredStatusEvent>, StorageError> {
        let events = self.events()?;
        Ok(events
            .iter()
            .map(|(_, stored)| stored)
            .filter(|stored| filter.matches(stored))
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn set_processing_state(
        &self,
        id: &StatusEventId,
        state: ProcessingState,
    ) -> Result<StoredStatusEvent, StorageError> {
        let key = StatusEventKey::from_event_id(id)?;
        let mut events = self.events()?;
        let index = events
            .binary_search_by(|(k, _)| k.cmp(&key))
            .map_err(|_| StorageError::NotFound(id.to_string()))?;
        let entry = &mut events[index].1;
        entry.state = state;
        entry.updated_at = Utc::now();
        debug!(event_id = %id, state = %state, "Updated status event state");
        Ok(entry.clone())
    }

    fn count(&self, storage_code: Option<&str>, processed: bool) -> Result<u64, StorageError> {
        let filter = EventFilter::new(storage_code, processed);
        let events = self.events()?;
        Ok(events.iter().filter(|(_, s)| filter.matches(s)).count() as u64)
    }

    fn find_access_groups(&self, storage_code: &str) -> Result<BTreeSet<i32>, StorageError> {
        let events = self.events()?;
        Ok(events
            .iter()
            .filter(|(_, s)| s.event.storage_code == storage_code)
            .filter_map(|(_, s)| s.event.access_group_id)
            .collect())
    }
}
