//! Supabase-style storage REST client

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use std::time::Duration;
use tracing::{debug, warn};

use super::ObjectSink;
use crate::config::StorageConfig;
use crate::error::ExportError;

/// Longest error body kept in messages and logs
const MAX_ERROR_BODY: usize = 512;

/// `POST {base_url}/storage/v1/object/{bucket}/{name}` with upsert
pub struct HttpSink {
    client: Client,
    base_url: String,
    bucket: String,
    key: String,
}

impl HttpSink {
    pub fn new(
        base_url: &str,
        bucket: &str,
        key: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ExportError> {
        if key.trim().is_empty() {
            return Err(ExportError::configuration("storage service key is not configured"));
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("exportbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExportError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, ExportError> {
        let key = config
            .key
            .as_deref()
            .ok_or_else(|| ExportError::configuration("storage service key is not configured"))?;

        Self::new(
            &config.base_url,
            &config.bucket,
            key,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, name)
    }
}

#[async_trait]
impl ObjectSink for HttpSink {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<Option<String>, ExportError> {
        let url = self.object_url(name);
        debug!(%url, size = bytes.len(), "POST object");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.key)
            .header("x-upsert", "true")
            .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::timeout(format!("upload to {url} timed out"))
                } else {
                    ExportError::upload(format!("request to {url} failed: {e}"), true)
                }
            })?;

        let status = response.status();
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string());

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            warn!(%url, status = status.as_u16(), body = %body, "Storage rejected upload");
            return Err(ExportError::upload_status(status.as_u16(), body));
        }

        Ok(etag)
    }

    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Retryable;
    use axum::{Router, extract::Path, http::HeaderMap, http::StatusCode, routing::post};
    use tokio::net::TcpListener;

    async fn spawn_mock(status: StatusCode) -> String {
        let app = Router::new().route(
            "/storage/v1/object/{bucket}/{name}",
            post(move |Path((bucket, name)): Path<(String, String)>, headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .is_some_and(|v| v == "Bearer service-key");
                let upsert = headers.get("x-upsert").is_some_and(|v| v == "true");
                if !authorized || !upsert {
                    return (StatusCode::BAD_REQUEST, format!("bad headers for {bucket}/{name}"));
                }
                (status, format!("{{\"Key\":\"{bucket}/{name}\"}}"))
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn sink(base_url: &str) -> HttpSink {
        HttpSink::new(
            base_url,
            "mobile-exports",
            "service-key",
            Duration::from_secs(2),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_success() {
        let base = spawn_mock(StatusCode::OK).await;
        let result = sink(&base).put("mobile-export.json", Bytes::from_static(b"{}")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let base = spawn_mock(StatusCode::SERVICE_UNAVAILABLE).await;
        let err = sink(&base).put("x.json", Bytes::from_static(b"{}")).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retryable() {
        let base = spawn_mock(StatusCode::UNAUTHORIZED).await;
        let err = sink(&base).put("x.json", Bytes::from_static(b"{}")).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = sink(&format!("http://{addr}"))
            .put("x.json", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = HttpSink::new(
            "http://localhost",
            "b",
            "",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
