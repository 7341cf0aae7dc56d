//! Read side of the business data
//!
//! The snapshot builder only ever sees a [`DataSource`]. [`MemoryStore`] is
//! the in-process implementation used by the binary and the tests; it is
//! also the persistence boundary that publishes commit and rollback
//! notifications on the [`EventBus`](crate::events::EventBus).

mod memory;
pub mod models;

pub use memory::{MemoryStore, Record, Transaction};
#[cfg(test)]
pub(crate) use memory::fixtures;
pub use models::{Cession, CessionStatus, Client, Dataset, Job, Payment, Workplace};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing store could not be reached; worth retrying
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("data source returned invalid data: {0}")]
    Invalid(String),

    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn clients(&self) -> Result<Vec<Client>, SourceError>;

    async fn payments(&self) -> Result<Vec<Payment>, SourceError>;

    async fn workplaces(&self) -> Result<Vec<Workplace>, SourceError>;

    async fn jobs(&self) -> Result<Vec<Job>, SourceError>;

    /// Number of clients; used as a reachability check
    async fn count(&self) -> Result<usize, SourceError>;
}
