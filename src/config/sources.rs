use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "EXPORTBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/exportbox.toml";
const ENV_PREFIX: &str = "EXPORTBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are only ever read from the environment
fn load_secrets(config: &mut Config) {
    if let Ok(key) = env::var("EXPORTBOX_STORAGE_KEY") {
        config.storage.key = Some(key);
    }

    if config.storage.key.is_none() {
        if let Ok(key) = env::var("SUPABASE_KEY") {
            config.storage.key = Some(key);
        }
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // EXPORTBOX__STORAGE__BUCKET -> storage.bucket
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageProvider;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.export.file_name, "mobile-export.json");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
ledger_path = "/var/lib/exportbox/ledger"

[storage]
provider = "http"
base_url = "https://abc.supabase.co"
bucket = "exports"

[export]
compact = false
max_snapshot_bytes = "10MB"

[retry.network]
max_attempts = 4
base_delay_ms = 250

[schedule]
default_cron = "0 30 6 * * MON-FRI"
tick_interval_secs = 30
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.storage.provider, StorageProvider::Http);
        assert_eq!(config.storage.base_url, "https://abc.supabase.co");
        assert!(!config.export.compact);
        assert_eq!(config.export.max_snapshot_bytes.as_u64(), 10 * 1024 * 1024);
        assert_eq!(config.retry.network.max_attempts, 4);
        assert_eq!(config.retry.network.max_delay_ms, 30_000);
        assert_eq!(config.retry.export.max_attempts, 3);
        assert_eq!(config.schedule.tick_interval_secs, 30);
    }

    #[test]
    fn test_key_is_never_read_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            "[storage]\nprovider = \"http\"\nkey = \"leaked-secret\"\n",
        )
        .unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert!(config.storage.key.is_none());
    }
}
