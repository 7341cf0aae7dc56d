/// Fjall-based persistence for export history and the recurring schedule
///
/// The ledger is the durable record of what the pipeline did. It stores:
///
/// - Export attempts: one immutable record per attempt, success or failure
/// - The schedule: a single record describing the recurring export
/// - Metadata: the attempt sequence counter
///
/// Attempts are append-only. Nothing here updates or deletes an attempt,
/// and there is no retention; history grows for the life of the keyspace.
///
/// ## Usage
///
/// ```rust,ignore
/// use exportbox::ledger::{StatusLedger, Trigger};
///
/// let ledger = StatusLedger::open("data/ledger")?;
/// ledger.record_failure("mobile-export.json", "HTTP 503", Trigger::Manual)?;
/// let stats = ledger.statistics()?;
/// ```

pub mod error;
pub mod models;
pub mod partitions;
pub mod store;

pub use error::{LedgerError, Result};
pub use models::{
    ExportAttemptRecord, ExportStatistics, ExportStatus, RunStatus, ScheduleConfig, Trigger,
};
pub use store::StatusLedger;
