use thiserror::Error;

/// Failures reading or writing the status ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("ledger record could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempt key or sequence counter that does not parse
    #[error("malformed ledger key: {0}")]
    InvalidKey(String),

    #[error("cannot prepare ledger directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
