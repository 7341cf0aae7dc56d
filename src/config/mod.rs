//! Configuration management for exportbox
//!
//! Layered configuration, lowest to highest priority:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use exportbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Uploading to bucket: {}", config.storage.bucket);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `EXPORTBOX__<section>__<key>`:
//! - `EXPORTBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `EXPORTBOX__STORAGE__PROVIDER=http`
//! - `EXPORTBOX__EXPORT__MAX_SNAPSHOT_BYTES=20MB`
//!
//! The storage service key is only read from `EXPORTBOX_STORAGE_KEY`
//! (or `SUPABASE_KEY`).
//!
//! # Configuration File
//!
//! Loaded from `config/exportbox.toml` unless `EXPORTBOX_CONFIG` points
//! elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, ExportConfig, RetryConfig, RetryPolicyConfig, ScheduleSettings, ServerConfig,
    SourceConfig, StorageConfig, StorageProvider,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails
    /// (missing storage key, bad cron expression, zero retry budget, ...).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Effective configuration as TOML; the storage key is never included
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[storage]\nbucket = \"exports-staging\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.storage.bucket, "exports-staging");
        assert_eq!(config.storage.provider, StorageProvider::Memory);
    }

    #[test]
    fn test_validation_catches_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[storage]\nprovider = \"http\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingStorageKey)
        ));
    }

    #[test]
    fn test_to_toml_round_trips_and_hides_key() {
        let mut config = Config::default();
        config.storage.key = Some("super-secret".to_string());

        let rendered = config.to_toml().unwrap();
        assert!(!rendered.contains("super-secret"));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.export.file_name, config.export.file_name);
        assert_eq!(parsed.schedule.default_cron, config.schedule.default_cron);
    }
}
