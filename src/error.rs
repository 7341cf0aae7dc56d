//! Export pipeline error type
//!
//! Every failure that crosses a pipeline boundary is an [`ExportError`]: a
//! single tagged value carrying its [`ErrorKind`], whether it is worth
//! retrying, and the attempt on which it was produced. Construct it through
//! the named factory functions rather than by hand.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::retry::Retryable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid destination credentials, bucket or endpoint
    Configuration,
    /// Fetching or serializing the snapshot failed
    DataGeneration,
    /// Remote object store rejected or never received the upload
    Upload,
    Timeout,
    /// Bad recurrence expression or malformed manual input
    Validation,
    /// The local ledger could not be read or written
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::DataGeneration => "data generation error",
            ErrorKind::Upload => "upload error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Validation => "validation error",
            ErrorKind::Storage => "storage error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ExportError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    attempt: u32,
    status: Option<u16>,
}

pub type Result<T> = std::result::Result<T, ExportError>;

impl ExportError {
    fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            attempt: 1,
            status: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message, false)
    }

    pub fn data_generation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataGeneration, message, false)
    }

    /// Data generation failure caused by a source that may come back
    /// (connection dropped, pool exhausted).
    pub fn data_generation_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataGeneration, message, true)
    }

    pub fn upload(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(ErrorKind::Upload, message, retryable)
    }

    /// Upload answered with a non-success HTTP status. 5xx is transient,
    /// everything else (auth, bad request, missing bucket) is not.
    pub fn upload_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        let mut error = Self::new(ErrorKind::Upload, message, (500..600).contains(&status));
        error.status = Some(status);
        error
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message, true)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, false)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message, false)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// HTTP status returned by the remote store, if any
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl Retryable for ExportError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn record_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }
}

impl From<crate::ledger::LedgerError> for ExportError {
    fn from(value: crate::ledger::LedgerError) -> Self {
        ExportError::storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ExportError::upload_status(503, "").is_retryable());
        assert!(ExportError::upload_status(500, "boom").is_retryable());
        assert!(!ExportError::upload_status(401, "invalid jwt").is_retryable());
        assert!(!ExportError::upload_status(404, "bucket not found").is_retryable());
        assert_eq!(ExportError::upload_status(403, "").status(), Some(403));
    }

    #[test]
    fn test_factories_set_retryability() {
        assert!(ExportError::timeout("read timed out").is_retryable());
        assert!(ExportError::upload("connection reset", true).is_retryable());
        assert!(!ExportError::configuration("missing key").is_retryable());
        assert!(!ExportError::validation("bad cron").is_retryable());
        assert!(!ExportError::data_generation("empty output").is_retryable());
        assert!(ExportError::data_generation_transient("pool closed").is_retryable());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = ExportError::upload_status(502, "bad gateway");
        assert_eq!(err.to_string(), "upload error: HTTP 502: bad gateway");
        assert_eq!(err.kind(), ErrorKind::Upload);
        assert_eq!(err.attempt(), 1);
    }
}
