//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::error::IndexingError;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Fails when a global
/// subscriber is already installed.
pub fn init_logging(level: &str) -> Result<(), IndexingError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| IndexingError::Usage(format!("Failed to set tracing subscriber: {}", e)))
}
