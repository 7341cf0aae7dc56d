use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;

use super::ObjectSink;
use crate::error::ExportError;

/// Sink backed by any `object_store` implementation. Objects live under
/// `{bucket}/{name}`.
#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    label: &'static str,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            label: "custom",
        }
    }

    /// In-process store for development and tests
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            bucket: bucket.into(),
            label: "memory",
        }
    }

    /// Files under `root/{bucket}/`
    pub fn local(root: impl AsRef<Path>, bucket: impl Into<String>) -> Result<Self, ExportError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|err| {
            ExportError::configuration(format!("cannot create {}: {err}", root.display()))
        })?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|err| ExportError::configuration(err.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.into(),
            label: "local",
        })
    }

    fn path(&self, name: &str) -> StoragePath {
        StoragePath::from(format!("{}/{}", self.bucket, name))
    }

    /// Read an object back; `None` when it does not exist
    pub async fn download(&self, name: &str) -> Result<Option<Bytes>, ExportError> {
        match self.store.get(&self.path(name)).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(map_store_error)?;
                Ok(Some(bytes))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(map_store_error(err)),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, ExportError> {
        match self.store.head(&self.path(name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(map_store_error(err)),
        }
    }
}

#[async_trait]
impl ObjectSink for ObjectStoreSink {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<Option<String>, ExportError> {
        let path = self.path(name);
        let size = bytes.len();

        let put_result = self.store.put(&path, bytes.into()).await.map_err(map_store_error)?;

        tracing::debug!(%path, size, "Stored object");
        Ok(put_result.e_tag)
    }

    fn describe(&self) -> String {
        format!("object_store:{}", self.label)
    }
}

/// Generic backend failures (I/O hiccups) are worth another attempt;
/// path and permission problems are not.
fn map_store_error(err: object_store::Error) -> ExportError {
    let retryable = matches!(err, object_store::Error::Generic { .. });
    ExportError::upload(err.to_string(), retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_overwrites() {
        let sink = ObjectStoreSink::in_memory("mobile-exports");

        sink.put("mobile-export.json", Bytes::from_static(b"first")).await.unwrap();
        sink.put("mobile-export.json", Bytes::from_static(b"second")).await.unwrap();

        let stored = sink.download("mobile-export.json").await.unwrap().unwrap();
        assert_eq!(stored, Bytes::from_static(b"second"));
        assert!(sink.exists("mobile-export.json").await.unwrap());
        assert!(!sink.exists("other.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_writes_under_bucket() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let sink = ObjectStoreSink::local(temp_dir.path(), "exports").unwrap();

        sink.put("snapshot.json", Bytes::from_static(b"{}")).await.unwrap();

        let on_disk = std::fs::read(temp_dir.path().join("exports").join("snapshot.json")).unwrap();
        assert_eq!(on_disk, b"{}");
        assert_eq!(sink.describe(), "object_store:local");
    }

    #[tokio::test]
    async fn test_download_missing() {
        let sink = ObjectStoreSink::in_memory("b");
        assert!(sink.download("nope.json").await.unwrap().is_none());
    }
}
