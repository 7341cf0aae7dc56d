//! Remote object storage for published snapshots
//!
//! [`Uploader`] names and times uploads and derives public URLs; the actual
//! write goes through an [`ObjectSink`]. Two sinks ship with the crate:
//!
//! - [`HttpSink`]: Supabase-style storage REST API over reqwest
//! - [`ObjectStoreSink`]: Apache Arrow `object_store` (in-memory or local disk)
//!
//! Sinks overwrite on every put, so re-uploading the same name is safe.
//! Nothing here retries; callers wrap uploads in a retry policy.

mod http;
mod object;

pub use http::HttpSink;
pub use object::ObjectStoreSink;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{StorageConfig, StorageProvider};
use crate::error::ExportError;
use crate::humanize::{ByteSize, format_duration};

/// Destination for named blobs with upsert semantics
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Write `bytes` under `name`, replacing any existing object.
    /// Returns the entity tag when the backend reports one.
    async fn put(&self, name: &str, bytes: Bytes) -> Result<Option<String>, ExportError>;

    /// Short label for logs and health output
    fn describe(&self) -> String;
}

/// Result of one successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub url: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub size: ByteSize,
    pub etag: Option<String>,
}

#[derive(Clone)]
pub struct Uploader {
    sink: Arc<dyn ObjectSink>,
    base_url: String,
    bucket: String,
}

impl Uploader {
    pub fn new(sink: Arc<dyn ObjectSink>, base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            sink,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    /// Build the sink selected by `storage.provider`
    ///
    /// # Errors
    ///
    /// `Configuration` when the base URL, bucket or provider-specific
    /// settings (service key, local root) are missing.
    pub fn from_config(config: &StorageConfig) -> Result<Self, ExportError> {
        if config.base_url.trim().is_empty() {
            return Err(ExportError::configuration("storage base URL is not configured"));
        }
        if config.bucket.trim().is_empty() {
            return Err(ExportError::configuration("storage bucket is not configured"));
        }

        let sink: Arc<dyn ObjectSink> = match config.provider {
            StorageProvider::Http => Arc::new(HttpSink::from_config(config)?),
            StorageProvider::Local => {
                let root = config.local_root.as_ref().ok_or_else(|| {
                    ExportError::configuration("storage.local_root is required for the local provider")
                })?;
                Arc::new(ObjectStoreSink::local(root, &config.bucket)?)
            }
            StorageProvider::Memory => Arc::new(ObjectStoreSink::in_memory(&config.bucket)),
        };

        info!(sink = %sink.describe(), bucket = %config.bucket, "Storage sink ready");
        Ok(Self::new(sink, &config.base_url, &config.bucket))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn describe(&self) -> String {
        self.sink.describe()
    }

    /// Public download address for an object; no I/O
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, name
        )
    }

    /// Push `bytes` under `name` once
    pub async fn upload(&self, name: &str, bytes: Bytes) -> Result<UploadReceipt, ExportError> {
        if name.trim().is_empty() {
            return Err(ExportError::validation("object name must not be empty"));
        }

        let size = ByteSize::of(&bytes);
        let started = Instant::now();
        debug!(name, size = %size, "Uploading object");

        let etag = self.sink.put(name, bytes).await?;
        let duration = started.elapsed();
        let url = self.public_url(name);

        info!(
            name,
            size = %size,
            took = %format_duration(duration),
            url = %url,
            "Upload completed"
        );

        Ok(UploadReceipt {
            url,
            duration,
            size,
            etag,
        })
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}
