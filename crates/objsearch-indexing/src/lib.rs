//! Indexing pipeline for objsearch.
//!
//! This crate consumes status events and keeps the search backend in step
//! with the source storage systems.
//!
//! ## Key Components
//!
//! - [`IndexingError`]: error taxonomy with [`ErrorKind`] classes driving retries
//! - [`Retrier`]: flat retries for transient errors, scheduled ones for fatal-retriable errors
//! - [`StatusEventQueue`]: paged, acknowledged traversal of unprocessed events
//! - [`EventHandler`] / [`IndexingStorage`]: storage-system and search-backend clients
//! - [`ParsingRulesRegistry`] and [`ObjectDecomposer`]: rule-driven document decomposition
//! - [`IndexerWorker`]: ties the pieces together
//!
//! ## Flow
//!
//! 1. The queue hands out unprocessed events in timestamp order
//! 2. Aggregate events are expanded by the storage system's handler
//! 3. New versions are loaded into a scratch file, decomposed per rule set
//!    and sent to the search backend
//! 4. The event is acknowledged as indexed, unindexed, or failed
//!
//! ## Example
//!
//! ```ignore
//! use objsearch_indexing::{IndexerWorker, Retrier, TracingRetryLogger, WorkerConfig};
//!
//! let retrier = Retrier::from_settings(&settings.worker, Arc::new(TracingRetryLogger))?;
//! let worker = IndexerWorker::new(
//!     store,
//!     vec![workspace_handler],
//!     search_backend,
//!     Arc::new(ParsingRulesRegistry::load_dir(&rules_dir)?),
//!     retrier,
//!     settings.expanded_scratch_dir(),
//!     WorkerConfig::from_settings(&settings.worker),
//! )
//! .with_cancellation(shutdown.clone());
//!
//! worker.run().await?;
//! ```

pub mod decompose;
pub mod error;
pub mod handler;
pub mod index_storage;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod retrier;
pub mod worker;

pub use decompose::{Decomposition, ObjectDecomposer, PendingReference};
pub use error::{ErrorKind, ErrorType, IndexingError};
pub use handler::{EventHandler, ResolvedReference};
pub use index_storage::{IndexObjectRequest, IndexedObject, IndexingStorage, ParsedObject};
pub use logging::init_logging;
pub use queue::StatusEventQueue;
pub use registry::ParsingRulesRegistry;
pub use retrier::{RetryLogger, Retrier, ScheduledBackoff, TracingRetryLogger};
pub use worker::{IndexerWorker, WorkerConfig, WorkerRunStats};
