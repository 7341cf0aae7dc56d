use super::models::{Config, RetryPolicyConfig, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Storage base_url must be an http(s) URL, got '{0}'")]
    InvalidBaseUrl(String),

    #[error("Storage bucket must not be empty")]
    EmptyBucket,

    #[error("Storage provider is http but no key is set (EXPORTBOX_STORAGE_KEY)")]
    MissingStorageKey,

    #[error("Storage provider is local but storage.local_root is not set")]
    MissingLocalRoot,

    #[error("Export file_name must be a plain object name, got '{0}'")]
    InvalidFileName(String),

    #[error("Retry policy '{name}' is invalid: {reason}")]
    InvalidRetryPolicy { name: String, reason: String },

    #[error("Default cron expression '{expression}' is invalid: {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Schedule tick interval must be positive")]
    ZeroTickInterval,

    #[error("max_snapshot_bytes must be positive")]
    ZeroSnapshotLimit,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_storage(config)?;
    validate_export(config)?;
    validate_retry("export", &config.retry.export)?;
    validate_retry("network", &config.retry.network)?;
    validate_schedule(config)?;
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let storage = &config.storage;

    if storage.bucket.trim().is_empty() {
        return Err(ValidationError::EmptyBucket);
    }

    if !(storage.base_url.starts_with("http://") || storage.base_url.starts_with("https://")) {
        return Err(ValidationError::InvalidBaseUrl(storage.base_url.clone()));
    }

    match storage.provider {
        StorageProvider::Http => {
            let has_key = storage.key.as_deref().is_some_and(|key| !key.trim().is_empty());
            if !has_key {
                return Err(ValidationError::MissingStorageKey);
            }
        }
        StorageProvider::Local => {
            if storage.local_root.is_none() {
                return Err(ValidationError::MissingLocalRoot);
            }
        }
        StorageProvider::Memory => {}
    }

    Ok(())
}

fn validate_export(config: &Config) -> Result<(), ValidationError> {
    let name = &config.export.file_name;
    if name.trim().is_empty() || name.starts_with('/') || name.contains("..") {
        return Err(ValidationError::InvalidFileName(name.clone()));
    }

    if config.export.max_snapshot_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroSnapshotLimit);
    }

    Ok(())
}

fn validate_retry(name: &str, policy: &RetryPolicyConfig) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidRetryPolicy {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if policy.max_attempts == 0 {
        return Err(invalid("max_attempts must be at least 1"));
    }
    if policy.base_delay_ms > policy.max_delay_ms {
        return Err(invalid("base_delay_ms exceeds max_delay_ms"));
    }

    Ok(())
}

fn validate_schedule(config: &Config) -> Result<(), ValidationError> {
    if config.schedule.tick_interval_secs == 0 {
        return Err(ValidationError::ZeroTickInterval);
    }

    crate::scheduler::validate_expression(&config.schedule.default_cron).map_err(|err| {
        ValidationError::InvalidCron {
            expression: config.schedule.default_cron.clone(),
            reason: err.message().to_string(),
        }
    })?;

    Ok(())
}
