//! Column family definitions for RocksDB.
//!
//! - status_events: every change notification keyed by time then ULID
//! - backlog: keys of unprocessed events, valued by storage code
//! - meta: store-wide counters

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for status events
pub const CF_STATUS_EVENTS: &str = "status_events";

/// Column family name for the unprocessed event index
pub const CF_BACKLOG: &str = "backlog";

/// Column family name for store metadata
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_STATUS_EVENTS, CF_BACKLOG, CF_META];

fn status_events_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_STATUS_EVENTS, status_events_options()),
        ColumnFamilyDescriptor::new(CF_BACKLOG, Options::default()),
        ColumnFamilyDescriptor::new(CF_META, Options::default()),
    ]
}
