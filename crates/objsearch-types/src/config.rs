//! Configuration loading for objsearch.
//!
//! Layered config: defaults -> config file -> env vars.
//! Default config file: ~/.config/objsearch/config.{toml,json,yaml}

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Indexer worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Attempts for transient errors
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Flat delay between transient retries (ms)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Escalating delays for fatal-but-retriable errors (ms).
    /// The length is the attempt budget for that error class.
    #[serde(default = "default_fatal_retry_backoffs_ms")]
    pub fatal_retry_backoffs_ms: Vec<u64>,

    /// Events fetched per cursor page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Cursor time-to-live (seconds)
    #[serde(default = "default_cursor_ttl_secs")]
    pub cursor_ttl_secs: u64,

    /// Upper bound on sub-objects extracted from one object
    #[serde(default = "default_max_sub_objects")]
    pub max_sub_objects: usize,

    /// Pause between queue drains when idle (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Storage codes this worker drains; empty means all codes in one queue
    #[serde(default)]
    pub storage_codes: Vec<String>,
}

fn default_retry_count() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_fatal_retry_backoffs_ms() -> Vec<u64> {
    vec![1_000, 2_000, 5_000, 10_000, 30_000]
}

fn default_page_size() -> usize {
    100
}

fn default_cursor_ttl_secs() -> u64 {
    600
}

fn default_max_sub_objects() -> usize {
    150_000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            fatal_retry_backoffs_ms: default_fatal_retry_backoffs_ms(),
            page_size: default_page_size(),
            cursor_ttl_secs: default_cursor_ttl_secs(),
            max_sub_objects: default_max_sub_objects(),
            poll_interval_ms: default_poll_interval_ms(),
            storage_codes: Vec::new(),
        }
    }
}

impl WorkerSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_count < 1 {
            return Err(ConfigError::Invalid("retry_count must be >= 1".to_string()));
        }
        if self.retry_delay_ms < 1 {
            return Err(ConfigError::Invalid("retry_delay_ms must be >= 1".to_string()));
        }
        if self.fatal_retry_backoffs_ms.iter().any(|b| *b < 1) {
            return Err(ConfigError::Invalid(
                "fatal_retry_backoffs_ms entries must be >= 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be > 0".to_string()));
        }
        if self.cursor_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cursor_ttl_secs must be > 0".to_string()));
        }
        if self.max_sub_objects == 0 {
            return Err(ConfigError::Invalid("max_sub_objects must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB status event store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory for scratch copies of source documents
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Worker tuning
    #[serde(default)]
    pub worker: WorkerSettings,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "objsearch")
}

fn default_db_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("events"))
        .unwrap_or_else(|| PathBuf::from("./events"))
        .to_string_lossy()
        .to_string()
}

fn default_scratch_dir() -> String {
    std::env::temp_dir()
        .join("objsearch-scratch")
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scratch_dir: default_scratch_dir(),
            log_level: default_log_level(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/objsearch/config.*)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (OBJSEARCH_*, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = project_dirs()
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::load_layers(Some(&config_dir.join("config")), config_path, "OBJSEARCH")
    }

    /// [`Self::load`] with the user config file and env prefix supplied.
    fn load_layers(
        user_config: Option<&Path>,
        config_path: Option<&str>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())?
            .set_default("scratch_dir", default_scratch_dir())?
            .set_default("log_level", default_log_level())?;

        if let Some(path) = user_config {
            builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(false));
        }
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.worker.validate()?;
        Ok(settings)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in scratch_dir to the home directory
    pub fn expanded_scratch_dir(&self) -> PathBuf {
        expand_home(&self.scratch_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.worker.retry_count, 5);
        assert_eq!(settings.worker.fatal_retry_backoffs_ms.len(), 5);
        assert!(settings.worker.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load_layers(None, None, "OBJSEARCH_TEST_UNSET").unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.worker.page_size, 100);
        assert!(settings.worker.storage_codes.is_empty());
    }

    #[test]
    fn test_missing_user_config_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::load_layers(Some(&dir.path().join("config")), None, "OBJSEARCH_TEST_UNSET").unwrap();
        assert_eq!(settings.worker.cursor_ttl_secs, 600);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[worker]\npage_size = 7").unwrap();
        std::env::set_var("OBJSEARCH_TEST_ENV_WORKER__PAGE_SIZE", "9");

        let settings = Settings::load_layers(
            None,
            Some(&file.path().to_string_lossy()),
            "OBJSEARCH_TEST_ENV",
        )
        .unwrap();
        std::env::remove_var("OBJSEARCH_TEST_ENV_WORKER__PAGE_SIZE");
        assert_eq!(settings.worker.page_size, 9);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[worker]\npage_size = 7\nfatal_retry_backoffs_ms = [10, 20]\nstorage_codes = [\"WS\"]"
        )
        .unwrap();

        let settings =
            Settings::load_layers(None, Some(&file.path().to_string_lossy()), "OBJSEARCH_TEST_UNSET")
                .unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.worker.page_size, 7);
        assert_eq!(settings.worker.fatal_retry_backoffs_ms, vec![10, 20]);
        assert_eq!(settings.worker.storage_codes, vec!["WS".to_string()]);
        assert_eq!(settings.worker.retry_count, 5);
    }

    #[test]
    fn test_worker_validation() {
        let mut worker = WorkerSettings::default();
        worker.retry_count = 0;
        assert!(worker.validate().is_err());

        let mut worker = WorkerSettings::default();
        worker.fatal_retry_backoffs_ms = vec![10, 0];
        assert!(worker.validate().is_err());

        let mut worker = WorkerSettings::default();
        worker.page_size = 0;
        assert!(worker.validate().is_err());
    }

    #[test]
    fn test_expand_home() {
        let settings = Settings {
            db_path: "/var/lib/objsearch".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/var/lib/objsearch"));
    }
}
