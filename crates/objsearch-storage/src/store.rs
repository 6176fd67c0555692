//! The status event store contract and its pagination cursor.
//!
//! Pages are computed from two counters kept on the cursor: events
//! delivered so far and events acknowledged so far. Acknowledged events
//! leave the filtered set, so the next page starts at
//! `delivered - acknowledged` within what remains.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::debug;
use ulid::Ulid;

use crate::error::StorageError;
use objsearch_types::{ProcessingState, StatusEvent, StatusEventId, StoredStatusEvent};

/// Which events a cursor or count looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Restrict to one storage code; `None` means all codes
    pub storage_code: Option<String>,
    /// Processed events instead of unprocessed ones
    pub processed: bool,
}

impl EventFilter {
    pub fn new(storage_code: Option<&str>, processed: bool) -> Self {
        Self {
            storage_code: storage_code.map(str::to_string),
            processed,
        }
    }

    pub fn matches(&self, stored: &StoredStatusEvent) -> bool {
        if stored.state.is_processed() != self.processed {
            return false;
        }
        match &self.storage_code {
            Some(code) => stored.event.storage_code == *code,
            None => true,
        }
    }
}

/// Server-side pagination state over a filtered event set.
#[derive(Debug, Clone)]
pub struct StatusEventCursor {
    id: String,
    filter: EventFilter,
    page_size: usize,
    ttl: Duration,
    expires_at: Instant,
    page: Vec<StoredStatusEvent>,
    delivered: u64,
    acknowledged: u64,
}

impl StatusEventCursor {
    /// Empty cursor. A page size of zero is treated as one.
    pub fn new(filter: EventFilter, page_size: usize, ttl: Duration) -> Self {
        Self {
            id: Ulid::new().to_string(),
            filter,
            page_size: page_size.max(1),
            ttl,
            expires_at: Instant::now() + ttl,
            page: Vec::new(),
            delivered: 0,
            acknowledged: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Events of the current page not yet taken.
    pub fn page(&self) -> &[StoredStatusEvent] {
        &self.page
    }

    /// Move the current page out of the cursor.
    pub fn take_page(&mut self) -> Vec<StoredStatusEvent> {
        std::mem::take(&mut self.page)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    /// Position of the next page within the remaining filtered set.
    pub fn offset(&self) -> u64 {
        self.delivered.saturating_sub(self.acknowledged)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Record acknowledgments and return the offset to load from.
    ///
    /// Fails with [`StorageError::CursorExpired`] once the TTL has passed.
    pub fn advance(&mut self, acknowledged_since_last: u64) -> Result<u64, StorageError> {
        if self.is_expired() {
            return Err(StorageError::CursorExpired(self.id.clone()));
        }
        self.acknowledged += acknowledged_since_last;
        Ok(self.offset())
    }

    /// Install a freshly loaded page and extend the TTL.
    pub fn install_page(&mut self, page: Vec<StoredStatusEvent>) -> bool {
        self.delivered += page.len() as u64;
        self.page = page;
        self.expires_at = Instant::now() + self.ttl;
        !self.page.is_empty()
    }
}

/// Durable store of status events.
///
/// Implementations order events by timestamp, then by id. Only the
/// processing state of a stored event ever changes.
pub trait StatusEventStorage: Send + Sync {
    /// Persist a new, unprocessed event.
    fn store(&self, event: StatusEvent) -> Result<StoredStatusEvent, StorageError>;

    fn get(&self, id: &StatusEventId) -> Result<Option<StoredStatusEvent>, StorageError>;

    /// Up to `limit` events matching `filter`, skipping the first `offset`.
    fn load_page(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredStatusEvent>, StorageError>;

    /// Replace the processing state of an event.
    fn set_processing_state(
        &self,
        id: &StatusEventId,
        state: ProcessingState,
    ) -> Result<StoredStatusEvent, StorageError>;

    fn count(&self, storage_code: Option<&str>, processed: bool) -> Result<u64, StorageError>;

    /// Distinct access groups that have events for `storage_code`.
    fn find_access_groups(&self, storage_code: &str) -> Result<BTreeSet<i32>, StorageError>;

    /// Open a cursor and load its first page.
    fn cursor(
        &self,
        storage_code: Option<&str>,
        processed: bool,
        page_size: usize,
        ttl: Duration,
    ) -> Result<StatusEventCursor, StorageError> {
        let mut cursor = StatusEventCursor::new(EventFilter::new(storage_code, processed), page_size, ttl);
        let page = self.load_page(cursor.filter(), 0, cursor.page_size())?;
        cursor.install_page(page);
        debug!(
            cursor_id = %cursor.id(),
            storage_code = ?storage_code,
            processed,
            loaded = cursor.page().len(),
            "Opened status event cursor"
        );
        Ok(cursor)
    }

    /// Replace the cursor's page with the next one.
    ///
    /// Returns true when the new page holds events.
    fn next_page(
        &self,
        cursor: &mut StatusEventCursor,
        acknowledged_since_last: u64,
    ) -> Result<bool, StorageError> {
        let offset = cursor.advance(acknowledged_since_last)?;
        let page = self.load_page(cursor.filter(), offset, cursor.page_size())?;
        let has_events = cursor.install_page(page);
        debug!(
            cursor_id = %cursor.id(),
            offset,
            loaded = cursor.page().len(),
            "Loaded status event page"
        );
        Ok(has_events)
    }

    /// Mark an event done, as indexed or as deliberately not indexed.
    fn mark_as_processed(
        &self,
        event: &StoredStatusEvent,
        was_indexed: bool,
    ) -> Result<StoredStatusEvent, StorageError> {
        let state = if was_indexed {
            ProcessingState::Indexed
        } else {
            ProcessingState::Unindexed
        };
        self.set_processing_state(&event.id, state)
    }
}

/// Behavior every driver must show. Called from each driver's tests.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use chrono::{TimeZone, Utc};
    use objsearch_types::StatusEventType;
    use std::collections::HashSet;

    pub fn event(code: &str, ts_ms: i64, group: i32) -> StatusEvent {
        StatusEvent::builder(
            code,
            StatusEventType::NewVersion,
            Utc.timestamp_millis_opt(ts_ms).unwrap(),
        )
        .with_access_group(group)
        .with_object_id(format!("{}", ts_ms))
        .with_version(1)
        .build()
    }

    pub fn drains_backlog(store: &dyn StatusEventStorage, total: usize, page_size: usize) {
        for i in 0..total {
            store.store(event("WS", 1_000 + i as i64, 1)).unwrap();
        }
        assert_eq!(store.count(Some("WS"), false).unwrap(), total as u64);

        let mut cursor = store
            .cursor(Some("WS"), false, page_size, Duration::from_secs(60))
            .unwrap();
        let mut seen = Vec::new();
        loop {
            let page = cursor.take_page();
            for stored in &page {
                store.mark_as_processed(stored, true).unwrap();
                seen.push(stored.id.clone());
            }
            if !store.next_page(&mut cursor, page.len() as u64).unwrap() {
                break;
            }
        }

        assert_eq!(seen.len(), total);
        let distinct: HashSet<_> = seen.iter().collect();
        assert_eq!(distinct.len(), total);
        assert_eq!(store.count(Some("WS"), false).unwrap(), 0);
        assert_eq!(store.count(Some("WS"), true).unwrap(), total as u64);
    }

    pub fn skips_unacknowledged(store: &dyn StatusEventStorage) {
        for i in 0..5 {
            store.store(event("WS", 2_000 + i, 1)).unwrap();
        }
        let mut cursor = store
            .cursor(None, false, 2, Duration::from_secs(60))
            .unwrap();
        let mut seen = Vec::new();
        let mut left_behind = None;
        loop {
            let page = cursor.take_page();
            let mut acked = 0;
            for stored in &page {
                seen.push(stored.event.access_group_object_id.clone());
                if left_behind.is_none() {
                    left_behind = Some(stored.id.clone());
                    continue;
                }
                store.mark_as_processed(stored, false).unwrap();
                acked += 1;
            }
            if !store.next_page(&mut cursor, acked).unwrap() {
                break;
            }
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(store.count(None, false).unwrap(), 1);
        let remaining = store.get(&left_behind.unwrap()).unwrap().unwrap();
        assert_eq!(remaining.state, ProcessingState::Unprocessed);
    }

    pub fn orders_by_timestamp(store: &dyn StatusEventStorage) {
        store.store(event("WS", 3_000, 1)).unwrap();
        store.store(event("WS", 1_000, 1)).unwrap();
        store.store(event("WS", 2_000, 1)).unwrap();
        let cursor = store
            .cursor(Some("WS"), false, 10, Duration::from_secs(60))
            .unwrap();
        let stamps: Vec<i64> = cursor.page().iter().map(|s| s.event.timestamp_ms()).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    /// Events sharing a timestamp come back in the order they were stored.
    pub fn keeps_insertion_order_within_timestamp(store: &dyn StatusEventStorage) {
        store.store(event("WS", 4_000, 1)).unwrap();
        for i in 0..20 {
            let event = StatusEvent::builder(
                "WS",
                StatusEventType::NewVersion,
                Utc.timestamp_millis_opt(5_000).unwrap(),
            )
            .with_access_group(1)
            .with_object_id(format!("obj{}", i))
            .build();
            store.store(event).unwrap();
        }
        store.store(event("WS", 6_000, 1)).unwrap();

        let mut cursor = store
            .cursor(Some("WS"), false, 7, Duration::from_secs(60))
            .unwrap();
        let mut order = Vec::new();
        loop {
            let page = cursor.take_page();
            for stored in &page {
                store.mark_as_processed(stored, true).unwrap();
                order.push(stored.event.access_group_object_id.clone().unwrap_or_default());
            }
            if !store.next_page(&mut cursor, page.len() as u64).unwrap() {
                break;
            }
        }

        let mut expected = vec!["4000".to_string()];
        expected.extend((0..20).map(|i| format!("obj{}", i)));
        expected.push("6000".to_string());
        assert_eq!(order, expected);
    }

    pub fn filters_and_groups(store: &dyn StatusEventStorage) {
        store.store(event("WS", 1, 7)).unwrap();
        store.store(event("WS", 2, 3)).unwrap();
        store.store(event("WS", 3, 7)).unwrap();
        let other = store.store(event("KE", 4, 11)).unwrap();

        assert_eq!(store.count(None, false).unwrap(), 4);
        assert_eq!(store.count(Some("KE"), false).unwrap(), 1);
        assert_eq!(
            store.find_access_groups("WS").unwrap().into_iter().collect::<Vec<_>>(),
            vec![3, 7]
        );
        assert!(store.find_access_groups("none").unwrap().is_empty());

        let updated = store
            .set_processing_state(&other.id, ProcessingState::Failed)
            .unwrap();
        assert_eq!(updated.state, ProcessingState::Failed);
        assert_eq!(updated.event, other.event);
        assert_eq!(store.count(Some("KE"), false).unwrap(), 0);
        assert_eq!(store.count(Some("KE"), true).unwrap(), 1);

        let missing = StatusEventId::generate();
        assert!(store.get(&missing).unwrap().is_none());
        assert!(matches!(
            store.set_processing_state(&missing, ProcessingState::Indexed),
            Err(StorageError::NotFound(_))
        ));
    }

    pub fn expires_cursor(store: &dyn StatusEventStorage) {
        store.store(event("WS", 1, 1)).unwrap();
        let mut cursor = store.cursor(None, false, 1, Duration::ZERO).unwrap();
        assert_eq!(cursor.page().len(), 1);
        assert!(matches!(
            store.next_page(&mut cursor, 0),
            Err(StorageError::CursorExpired(_))
        ));
    }
}
