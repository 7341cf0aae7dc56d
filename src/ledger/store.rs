use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use super::error::{LedgerError, Result};
use super::models::{ExportAttemptRecord, ExportStatistics, ExportStatus, ScheduleConfig, Trigger};
use super::partitions::{
    ACTIVE_SCHEDULE_KEY, decode_attempt_key, encode_attempt_key, encode_meta_key,
};
use crate::snapshot::models::RecordCounts;

const META_ATTEMPT_SEQ: &str = "attempt_seq";

/// Append-only export history plus the schedule record, on Fjall
#[derive(Clone)]
pub struct StatusLedger {
    keyspace: Keyspace,
    attempts: PartitionHandle,
    schedule: PartitionHandle,
    metadata: PartitionHandle,
    seq: Arc<AtomicU64>,
}

impl StatusLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening status ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let attempts = keyspace.open_partition("attempts", PartitionCreateOptions::default())?;
        let schedule = keyspace.open_partition("schedule", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let next_seq = Self::recover_seq(&attempts, &metadata)?;
        debug!(next_seq, "Attempt sequence recovered");

        Ok(Self {
            keyspace,
            attempts,
            schedule,
            metadata,
            seq: Arc::new(AtomicU64::new(next_seq)),
        })
    }

    /// Next free sequence number: one past both the stored counter and the
    /// newest key, whichever is larger
    fn recover_seq(attempts: &PartitionHandle, metadata: &PartitionHandle) -> Result<u64> {
        let stored = match metadata.get(encode_meta_key(META_ATTEMPT_SEQ))? {
            Some(value) => String::from_utf8_lossy(&value)
                .parse::<u64>()
                .map_err(|e| LedgerError::InvalidKey(format!("attempt_seq: {e}")))?,
            None => 0,
        };

        let from_keys = match attempts.iter().next_back() {
            Some(item) => {
                let (key, _) = item?;
                let (_, seq) = decode_attempt_key(&key)
                    .ok_or_else(|| LedgerError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
                seq + 1
            }
            None => 0,
        };

        Ok(stored.max(from_keys))
    }

    /// Write one attempt record under a fresh key. Never overwrites.
    pub fn append(&self, record: &ExportAttemptRecord) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let micros = u64::try_from(record.export_timestamp.timestamp_micros()).unwrap_or(0);
        let key = encode_attempt_key(micros, seq);
        let value = serde_json::to_vec(record)?;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.attempts, key, value);
        batch.insert(
            &self.metadata,
            encode_meta_key(META_ATTEMPT_SEQ),
            (seq + 1).to_string().into_bytes(),
        );
        batch.commit()?;

        debug!(id = %record.id, status = %record.status, seq, "Recorded export attempt");
        Ok(())
    }

    pub fn record_success(
        &self,
        file_name: &str,
        url: &str,
        counts: &RecordCounts,
        file_size_bytes: u64,
        trigger: Trigger,
    ) -> Result<ExportAttemptRecord> {
        let record = ExportAttemptRecord::success(file_name, url, counts, file_size_bytes, trigger);
        self.append(&record)?;
        info!(
            file_name,
            url,
            records = counts.clients,
            file_size_bytes,
            %trigger,
            "Export success recorded"
        );
        Ok(record)
    }

    pub fn record_failure(
        &self,
        file_name: &str,
        error_message: &str,
        trigger: Trigger,
    ) -> Result<ExportAttemptRecord> {
        let record = ExportAttemptRecord::failure(file_name, error_message, trigger);
        self.append(&record)?;
        warn!(file_name, error = error_message, %trigger, "Export failure recorded");
        Ok(record)
    }

    /// Newest-first iterator over every attempt
    fn newest_first(&self) -> impl Iterator<Item = Result<ExportAttemptRecord>> + '_ {
        self.attempts.iter().rev().map(|item| {
            let (_, value) = item?;
            Ok(serde_json::from_slice(&value)?)
        })
    }

    pub fn latest(&self) -> Result<Option<ExportAttemptRecord>> {
        self.newest_first().next().transpose()
    }

    pub fn latest_successful(&self) -> Result<Option<ExportAttemptRecord>> {
        for record in self.newest_first() {
            let record = record?;
            if record.is_success() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Every attempt, newest first
    pub fn all(&self) -> Result<Vec<ExportAttemptRecord>> {
        self.newest_first().collect()
    }

    pub fn by_outcome(&self, status: ExportStatus) -> Result<Vec<ExportAttemptRecord>> {
        let mut records = Vec::new();
        for record in self.newest_first() {
            let record = record?;
            if record.status == status {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn statistics(&self) -> Result<ExportStatistics> {
        let mut stats = ExportStatistics::default();
        for record in self.newest_first() {
            let record = record?;
            stats.total += 1;
            match record.status {
                ExportStatus::Success => {
                    stats.successful += 1;
                    if stats.last_successful_at.is_none() {
                        stats.last_successful_at = Some(record.export_timestamp);
                    }
                }
                ExportStatus::Failed => stats.failed += 1,
                ExportStatus::InProgress => {}
            }
        }
        Ok(stats)
    }

    pub fn load_schedule(&self) -> Result<Option<ScheduleConfig>> {
        match self.schedule.get(ACTIVE_SCHEDULE_KEY)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn save_schedule(&self, schedule: &ScheduleConfig) -> Result<()> {
        let value = serde_json::to_vec(schedule)?;
        self.schedule.insert(ACTIVE_SCHEDULE_KEY, value)?;
        debug!(enabled = schedule.enabled, cron = %schedule.cron_expression, "Saved schedule");
        Ok(())
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Cheap read that fails if the keyspace is unusable
    pub fn health_check(&self) -> Result<()> {
        self.metadata.get(encode_meta_key(META_ATTEMPT_SEQ))?;
        Ok(())
    }
}
