//! Configuration management for docbatch.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use docbatch_server::config::DocbatchConfig;
//!
//! // Load from file with env overrides
//! let config = DocbatchConfig::load("docbatch.yaml")?;
//!
//! // Or load from environment only
//! let config = DocbatchConfig::from_env()?;
//!
//! let scope = LoaderScope::with_config(config.loader.to_loader_config());
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use docbatch_domain::LoaderConfig;
use docbatch_storage::MAX_IN_FILTER_SIZE;

use crate::observability::{self, LoggingConfig};

/// docbatch configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DocbatchConfig {
    /// Loader settings
    #[serde(default)]
    pub loader: LoaderSettings,

    /// Document store settings
    #[serde(default)]
    pub store: StoreSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Batching and caching settings applied to every loader of a scope.
///
/// Environment variables use the `DOCBATCH_` prefix and `__` as the nested
/// key separator:
///
/// - `DOCBATCH_LOADER__YIELD_COUNT=2`
/// - `DOCBATCH_LOADER__MAX_BATCH_SIZE=100`
/// - `DOCBATCH_LOADER__CACHE_ENABLED=false`
///
/// # Example YAML Configuration
///
/// ```yaml
/// loader:
///   yield_count: 1
///   max_batch_size: 100
///   cache_enabled: true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoaderSettings {
    /// Number of executor yields before a batch group is dispatched.
    #[serde(default = "default_yield_count")]
    pub yield_count: usize,

    /// Keys per batch-function call. Unbounded when absent.
    #[serde(default)]
    pub max_batch_size: Option<usize>,

    /// Keep settled results for the life of the scope.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            yield_count: default_yield_count(),
            max_batch_size: None,
            cache_enabled: true,
        }
    }
}

impl LoaderSettings {
    /// Builds the loader configuration these settings describe.
    pub fn to_loader_config(&self) -> LoaderConfig {
        let config = LoaderConfig::default()
            .with_yield_count(self.yield_count)
            .with_cache_enabled(self.cache_enabled);
        match self.max_batch_size {
            Some(size) => config.with_max_batch_size(size),
            None => config,
        }
    }
}

fn default_yield_count() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Document store settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StoreSettings {
    /// Store backend type: "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Ids per equality-set fetch, at most the backend's IN-filter bound
    #[serde(default = "default_max_in_filter_size")]
    pub max_in_filter_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            max_in_filter_size: default_max_in_filter_size(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_max_in_filter_size() -> usize {
    MAX_IN_FILTER_SIZE
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// Builds the logging configuration. Call after [`DocbatchConfig::validate`].
    pub fn to_logging_config(&self) -> LoggingConfig {
        let level = self
            .level
            .to_lowercase()
            .parse()
            .unwrap_or(tracing::Level::INFO);
        let config = if self.json {
            LoggingConfig::json()
        } else {
            LoggingConfig::text()
        };
        config.with_level(level)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl DocbatchConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `DOCBATCH_` and use `__` as
    /// separator, e.g. `DOCBATCH_STORE__MAX_IN_FILTER_SIZE=5` overrides
    /// `store.max_in_filter_size`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&DocbatchConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let docbatch_config: DocbatchConfig = config.try_deserialize()?;
        docbatch_config.validate()?;

        Ok(docbatch_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&DocbatchConfig::default())?)
            .add_source(env_source())
            .build()?;

        let docbatch_config: DocbatchConfig = config.try_deserialize()?;
        docbatch_config.validate()?;

        Ok(docbatch_config)
    }

    /// Installs the global logging subscriber from `logging` and describes the
    /// loader metrics to the installed recorder.
    ///
    /// Returns false if a global subscriber was already installed.
    pub fn init_logging(&self) -> bool {
        let installed = observability::init_logging(self.logging.to_logging_config());
        docbatch_domain::loader::register_loader_metrics();
        installed
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.loader.yield_count == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "loader.yield_count must be greater than 0".to_string(),
            });
        }

        if self.loader.max_batch_size == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "loader.max_batch_size must be greater than 0".to_string(),
            });
        }

        if self.store.backend != "memory" {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "store.backend must be one of: [\"memory\"], got: {}",
                    self.store.backend
                ),
            });
        }

        let size = self.store.max_in_filter_size;
        if !(1..=MAX_IN_FILTER_SIZE).contains(&size) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "store.max_in_filter_size must be between 1 and {MAX_IN_FILTER_SIZE}, got: {size}"
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

// DOCBATCH_LOADER__YIELD_COUNT -> loader.yield_count
fn env_source() -> Environment {
    Environment::with_prefix("DOCBATCH")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
