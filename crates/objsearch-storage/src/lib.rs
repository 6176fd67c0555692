//! Status event store for objsearch.
//!
//! Provides:
//! - The [`StatusEventStorage`] contract with cursor-based pagination
//! - An in-memory driver for tests and embedding
//! - A RocksDB driver with time-prefixed keys for ordered scans

pub mod column_families;
pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod store;

pub use error::StorageError;
pub use keys::StatusEventKey;
pub use memory::MemoryStatusEventStorage;
pub use rocks::RocksStatusEventStorage;
pub use store::{EventFilter, StatusEventCursor, StatusEventStorage};
