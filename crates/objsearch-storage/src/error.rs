//! Event store error types.

use thiserror::Error;

/// Errors that can occur in the status event store
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Status event not found
    #[error("Status event not found: {0}")]
    NotFound(String),

    /// Cursor outlived its time-to-live; open a new one
    #[error("Cursor expired: {0}")]
    CursorExpired(String),

    /// Lock guarding in-memory state was poisoned
    #[error("Store lock poisoned: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StorageError::CursorExpired("01J0".to_string());
        assert_eq!(err.to_string(), "Cursor expired: 01J0");

        let json_err = serde_json::from_slice::<u8>(b"x").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
