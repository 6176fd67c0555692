//! # objsearch-parse
//!
//! Single-pass decomposition of large source documents.
//!
//! Documents are consumed as a serde token stream. Two walkers share the
//! same path tries:
//! - [`SubObjectExtractor`] slices out sub-documents at a selector path,
//!   keeping only the retained sub-paths
//! - [`ValueCollector`] and [`IdCollector`] report scalars found at
//!   declared paths
//!
//! Anything outside the declared paths is skipped without being built in
//! memory.

pub mod collect;
pub mod error;
pub mod extract;
pub mod trie;

pub use collect::{
    collect_ids, collect_values, IdCollector, IdMatch, IdTarget, Scalar, ValueCollector,
};
pub use error::ParseError;
pub use extract::{extract_from_reader, extract_from_slice, extract_sub_objects, SubObjectExtractor};
pub use trie::{ExtractionMark, ExtractionTrie, NodeId, ValueCollectingTrie, ROOT};
