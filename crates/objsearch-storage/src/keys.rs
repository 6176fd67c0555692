//! Key encoding for the status event column family.
//!
//! Key format: `sev:{timestamp_ms:013}:{ulid}`
//! - timestamp_ms: event timestamp, zero-padded so keys sort by time
//! - ulid: the event id; its embedded timestamp equals `timestamp_ms` and
//!   its random part leads with the store's insertion sequence
//!
//! Because the id carries the timestamp, a key can be rebuilt from an id
//! alone without a secondary index. Events sharing a timestamp sort in
//! insertion order.

use ulid::Ulid;

use crate::error::StorageError;
use objsearch_types::StatusEventId;

const PREFIX: &str = "sev";

/// Key for a stored status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusEventKey {
    /// Event timestamp in milliseconds
    pub timestamp_ms: i64,
    /// Unique identifier (also serves as the event id)
    pub ulid: Ulid,
}

impl StatusEventKey {
    /// Fresh key for the `sequence`-th event stored, stamped `timestamp_ms`.
    ///
    /// The upper 64 of the ULID's 80 random bits hold `sequence`; the rest
    /// stay random. Timestamps before the epoch are clamped to zero in the
    /// ULID so the id still round-trips to this key.
    pub fn new(timestamp_ms: i64, sequence: u64) -> Self {
        let timestamp_ms = timestamp_ms.max(0);
        let salt = Ulid::new().random() & 0xFFFF;
        let random = (u128::from(sequence) << 16) | salt;
        let ulid = Ulid::from_parts(timestamp_ms as u64, random);
        Self { timestamp_ms, ulid }
    }

    /// Insertion sequence carried in the ULID.
    pub fn sequence(&self) -> u64 {
        (self.ulid.random() >> 16) as u64
    }

    pub fn from_parts(timestamp_ms: i64, ulid: Ulid) -> Self {
        Self { timestamp_ms, ulid }
    }

    /// Rebuild the key from an event id using the ULID's timestamp.
    pub fn from_event_id(id: &StatusEventId) -> Result<Self, StorageError> {
        let ulid: Ulid = id
            .as_str()
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid event id ULID: {}", e)))?;
        Ok(Self {
            timestamp_ms: ulid.timestamp_ms() as i64,
            ulid,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}:{:013}:{}", PREFIX, self.timestamp_ms, self.ulid).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        Self::parse(s)
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != PREFIX {
            return Err(StorageError::Key(format!(
                "Invalid status event key format: {}",
                s
            )));
        }

        let timestamp_ms: i64 = parts[1]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid timestamp: {}", e)))?;
        let ulid: Ulid = parts[2]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid ULID: {}", e)))?;

        Ok(Self { timestamp_ms, ulid })
    }

    pub fn event_id(&self) -> StatusEventId {
        StatusEventId::new(self.ulid.to_string())
    }

    /// Lower bound for a scan over every status event.
    pub fn scan_start() -> Vec<u8> {
        format!("{}:", PREFIX).into_bytes()
    }
}
