//! Host-facing configuration for binaries that embed the engine.
//!
//! Hierarchical loading from:
//! - `engine.toml` (default configuration)
//! - `engine.local.toml` (git-ignored local overrides)
//! - Environment variables (`INCREMENTAL_*` prefix, `__`-nested)
//!
//! ## Example
//!
//! ```toml
//! # engine.toml
//! [storage]
//! data_dir = "/var/lib/increap/data"
//! cache_capacity = 10000
//! ```
//!
//! ```bash
//! INCREMENTAL_STORAGE__DATA_DIR=/custom/path
//! INCREMENTAL_LOGGING__LEVEL=debug
//! ```
//!
//! `EngineConfig` is a convenience for host binaries; embedders that already
//! have a `Store` and node definitions can skip it entirely and call
//! [`crate::Engine::new`] directly.

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the sled database directory.
    pub data_dir: PathBuf,

    /// Concrete-node LRU capacity (default 10,000).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive (e.g. `info`, `increap=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl EngineConfig {
    /// Merges `engine.toml`, `engine.local.toml`, and `INCREMENTAL_`-prefixed
    /// environment variables, in that order of increasing precedence.
    pub fn load() -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file("engine.toml"))
            .merge(Toml::file("engine.local.toml"))
            .merge(Env::prefixed("INCREMENTAL_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("INCREMENTAL_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                cache_capacity: default_cache_capacity(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_cache_capacity() {
        let config = EngineConfig::default();
        assert_eq!(config.storage.cache_capacity, 10_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn serializes_to_expected_toml_sections() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[logging]"));
    }
}
