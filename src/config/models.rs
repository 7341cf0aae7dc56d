use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub source: SourceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Fjall keyspace holding export attempts and the schedule record
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Where snapshots are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Supabase-style storage REST API
    Http,
    /// Local filesystem under `storage.local_root`
    Local,
    /// Process memory; development and tests only
    #[default]
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Base address of the storage service, also used for public URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Service key (loaded from environment, never from the config file)
    #[serde(skip)]
    pub key: Option<String>,
    pub local_root: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            base_url: default_base_url(),
            bucket: default_bucket(),
            key: None,
            local_root: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_bucket() -> String {
    "mobile-exports".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Snapshot naming and encoding
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Object name for change-triggered and scheduled exports
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Emit minified JSON instead of indented
    #[serde(default = "default_compact")]
    pub compact: bool,
    #[serde(default = "default_format_version")]
    pub format_version: String,
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_snapshot_bytes: ByteSize,
    /// Manual and test exports get `mobile-export_YYYY-MM-DD_HH-mm-ss.json`
    #[serde(default = "default_timestamped_manual_names")]
    pub timestamped_manual_names: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            compact: default_compact(),
            format_version: default_format_version(),
            max_snapshot_bytes: default_max_snapshot_bytes(),
            timestamped_manual_names: default_timestamped_manual_names(),
        }
    }
}

fn default_file_name() -> String {
    "mobile-export.json".to_string()
}

fn default_compact() -> bool {
    true
}

fn default_format_version() -> String {
    "1.0".to_string()
}

fn default_max_snapshot_bytes() -> ByteSize {
    ByteSize(50 * 1024 * 1024) // 50 MB
}

fn default_timestamped_manual_names() -> bool {
    true
}

/// One retry budget
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Retry budgets for snapshot generation and network uploads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_export_retry")]
    pub export: RetryPolicyConfig,
    #[serde(default = "default_network_retry")]
    pub network: RetryPolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            export: default_export_retry(),
            network: default_network_retry(),
        }
    }
}

fn default_export_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_attempts: 3,
        base_delay_ms: 1000,
        max_delay_ms: default_max_delay_ms(),
    }
}

fn default_network_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_attempts: 5,
        base_delay_ms: 2000,
        max_delay_ms: default_max_delay_ms(),
    }
}

/// Recurring export settings that are not part of the persisted schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleSettings {
    /// Expression used when the schedule record is first created
    #[serde(default = "default_cron")]
    pub default_cron: String,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            default_cron: default_cron(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

fn default_cron() -> String {
    "0 0 10 * * SAT".to_string()
}

fn default_tick_interval_secs() -> u64 {
    60
}

/// Development data source
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceConfig {
    /// JSON dataset loaded into the in-memory store at startup
    pub seed_path: Option<PathBuf>,
}
