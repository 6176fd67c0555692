//! Iterator-style access to unprocessed status events.
//!
//! The queue pulls pages through a [`StatusEventCursor`] and hands events
//! out one at a time. The caller acknowledges each event it finished with
//! [`StatusEventQueue::mark_as_visited`] or [`StatusEventQueue::mark_as_failed`];
//! events never acknowledged stay unprocessed in the store and are picked
//! up by a later queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::IndexingError;
use objsearch_storage::{StatusEventCursor, StatusEventStorage};
use objsearch_types::{ProcessingState, StoredStatusEvent};

/// Single-consumer queue over one storage code (or all codes).
pub struct StatusEventQueue {
    store: Arc<dyn StatusEventStorage>,
    storage_code: Option<String>,
    page_size: usize,
    ttl: Duration,
    cursor: Option<StatusEventCursor>,
    buffer: VecDeque<StoredStatusEvent>,
    current: Option<StoredStatusEvent>,
    acknowledged_since_page: u64,
    acknowledged: u64,
    delivered: u64,
    exhausted: bool,
}

impl StatusEventQueue {
    /// Queue over unprocessed events. The cursor opens on first use.
    pub fn new(
        store: Arc<dyn StatusEventStorage>,
        storage_code: Option<&str>,
        page_size: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            storage_code: storage_code.map(str::to_string),
            page_size,
            ttl,
            cursor: None,
            buffer: VecDeque::new(),
            current: None,
            acknowledged_since_page: 0,
            acknowledged: 0,
            delivered: 0,
            exhausted: false,
        }
    }

    /// True when another event is available.
    ///
    /// Fetches the next page only once the buffered one is used up.
    pub fn has_next(&mut self) -> Result<bool, IndexingError> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }

        let page = match self.cursor.as_mut() {
            None => {
                let mut cursor = self.store.cursor(
                    self.storage_code.as_deref(),
                    false,
                    self.page_size,
                    self.ttl,
                )?;
                let page = cursor.take_page();
                self.cursor = Some(cursor);
                page
            }
            Some(cursor) => {
                self.store
                    .next_page(cursor, self.acknowledged_since_page)?;
                self.acknowledged_since_page = 0;
                cursor.take_page()
            }
        };

        debug!(
            storage_code = ?self.storage_code,
            loaded = page.len(),
            "Buffered status event page"
        );
        if page.is_empty() {
            self.exhausted = true;
            return Ok(false);
        }
        self.buffer.extend(page);
        Ok(true)
    }

    /// Next event, or [`IndexingError::NoMoreElements`].
    ///
    /// An unacknowledged previous event is left unprocessed.
    pub fn next(&mut self) -> Result<StoredStatusEvent, IndexingError> {
        if !self.has_next()? {
            return Err(IndexingError::NoMoreElements);
        }
        let event = self
            .buffer
            .pop_front()
            .ok_or(IndexingError::NoMoreElements)?;
        self.delivered += 1;
        self.current = Some(event.clone());
        Ok(event)
    }

    /// Acknowledge the last returned event as processed.
    pub fn mark_as_visited(&mut self, indexed: bool) -> Result<StoredStatusEvent, IndexingError> {
        let current = self.pending()?;
        let updated = self.store.mark_as_processed(current, indexed)?;
        self.acknowledge();
        Ok(updated)
    }

    /// Acknowledge the last returned event as failed.
    pub fn mark_as_failed(&mut self) -> Result<StoredStatusEvent, IndexingError> {
        let current = self.pending()?;
        let updated = self
            .store
            .set_processing_state(&current.id, ProcessingState::Failed)?;
        self.acknowledge();
        Ok(updated)
    }

    fn pending(&self) -> Result<&StoredStatusEvent, IndexingError> {
        self.current.as_ref().ok_or_else(|| {
            IndexingError::Usage("no unacknowledged event: call next() first".to_string())
        })
    }

    fn acknowledge(&mut self) {
        self.current = None;
        self.acknowledged += 1;
        self.acknowledged_since_page += 1;
    }

    /// Events acknowledged through this queue.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    /// Events handed out by [`Self::next`].
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}
