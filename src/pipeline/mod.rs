//! Snapshot → upload → ledger
//!
//! [`ExportPipeline`] is the one place an export happens. Every caller
//! (change listener, scheduler, REST, CLI) goes through [`ExportRunner`],
//! and every attempt ends with exactly one ledger record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::Config;
use crate::error::ExportError;
use crate::humanize::format_duration;
use crate::ledger::{ExportAttemptRecord, StatusLedger, Trigger};
use crate::observability::Metrics;
use crate::retry::{RetryPolicy, is_retryable, run_with_retry};
use crate::snapshot::{BuiltSnapshot, SnapshotBuilder};
use crate::source::DataSource;
use crate::storage::{UploadReceipt, Uploader};

pub const DEFAULT_FILE_NAME: &str = "mobile-export.json";

/// Something that can run a full export
#[async_trait]
pub trait ExportRunner: Send + Sync {
    /// Run one export and record its outcome. A failed export still
    /// returns `Ok` with a failure record; `Err` means the outcome itself
    /// could not be written to the ledger.
    async fn run(&self, trigger: Trigger) -> Result<ExportAttemptRecord, ExportError>;

    /// Like [`run`](Self::run) but never fails: if the ledger write fails
    /// too, an unsaved failure record is returned instead.
    async fn force_export(&self, trigger: Trigger) -> ExportAttemptRecord;
}

#[derive(bon::Builder)]
pub struct ExportPipeline {
    snapshots: SnapshotBuilder,
    uploader: Uploader,
    ledger: StatusLedger,
    #[builder(default)]
    export_policy: RetryPolicy,
    #[builder(default = RetryPolicy::builder()
        .max_attempts(5)
        .base_delay(Duration::from_secs(2))
        .build())]
    network_policy: RetryPolicy,
    #[builder(default = DEFAULT_FILE_NAME.to_string())]
    file_name: String,
    #[builder(default = true)]
    compact: bool,
    /// Manual and test runs get a timestamped object name
    #[builder(default = true)]
    timestamped_manual_names: bool,
    #[builder(default)]
    metrics: Arc<Metrics>,
    /// Held from build to upload so a stale snapshot never lands last
    #[builder(skip)]
    publish_lock: Mutex<()>,
}

impl ExportPipeline {
    pub fn from_config(
        config: &Config,
        source: Arc<dyn DataSource>,
        ledger: StatusLedger,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ExportError> {
        let uploader = Uploader::from_config(&config.storage)?;

        Ok(Self::builder()
            .snapshots(SnapshotBuilder::new(source, &config.export))
            .uploader(uploader)
            .ledger(ledger)
            .export_policy(RetryPolicy::from(&config.retry.export))
            .network_policy(RetryPolicy::from(&config.retry.network))
            .file_name(config.export.file_name.clone())
            .compact(config.export.compact)
            .timestamped_manual_names(config.export.timestamped_manual_names)
            .metrics(metrics)
            .build())
    }

    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    pub fn snapshots(&self) -> &SnapshotBuilder {
        &self.snapshots
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Object name for a run. Change-triggered and scheduled runs always
    /// overwrite the same object; manual and test runs get
    /// `{stem}_YYYY-MM-DD_HH-mm-ss.json` unless disabled.
    pub fn file_name_for(&self, trigger: Trigger, now: DateTime<Utc>) -> String {
        match trigger {
            Trigger::ChangeEvent | Trigger::Scheduled => self.file_name.clone(),
            Trigger::Manual | Trigger::Test if self.timestamped_manual_names => {
                let (stem, ext) = match self.file_name.rsplit_once('.') {
                    Some((stem, ext)) => (stem, ext),
                    None => (self.file_name.as_str(), "json"),
                };
                format!("{stem}_{}.{ext}", now.format("%Y-%m-%d_%H-%M-%S"))
            }
            Trigger::Manual | Trigger::Test => self.file_name.clone(),
        }
    }

    async fn build_and_upload(
        &self,
        file_name: &str,
    ) -> Result<(BuiltSnapshot, UploadReceipt), ExportError> {
        let _publishing = self.publish_lock.lock().await;
        let snapshot = run_with_retry(
            "build_snapshot",
            &self.export_policy,
            is_retryable::<ExportError>,
            |_| self.snapshots.build(self.compact),
        )
        .await?;

        let metrics = &self.metrics;
        let receipt = run_with_retry(
            "upload_snapshot",
            &self.network_policy,
            is_retryable::<ExportError>,
            |attempt| {
                if attempt > 1 {
                    metrics.upload_retried();
                }
                self.uploader.upload(file_name, snapshot.bytes.clone())
            },
        )
        .await?;

        Ok((snapshot, receipt))
    }

    async fn execute(
        &self,
        trigger: Trigger,
        file_name: &str,
    ) -> Result<ExportAttemptRecord, ExportError> {
        let started = Instant::now();
        info!(%trigger, file_name, "Export starting");

        match self.build_and_upload(file_name).await {
            Ok((snapshot, receipt)) => {
                let record = self.ledger.record_success(
                    file_name,
                    &receipt.url,
                    &snapshot.counts,
                    receipt.size.as_u64(),
                    trigger,
                )?;
                self.metrics.export_succeeded();
                info!(
                    %trigger,
                    file_name,
                    url = %receipt.url,
                    size = %receipt.size,
                    took = %format_duration(started.elapsed()),
                    "Export completed"
                );
                Ok(record)
            }
            Err(err) => {
                self.metrics.export_failed();
                error!(
                    %trigger,
                    file_name,
                    kind = %err.kind(),
                    attempt = err.attempt(),
                    error = %err,
                    took = %format_duration(started.elapsed()),
                    "Export failed"
                );
                let record = self.ledger.record_failure(file_name, &err.to_string(), trigger)?;
                Ok(record)
            }
        }
    }
}

#[async_trait]
impl ExportRunner for ExportPipeline {
    async fn run(&self, trigger: Trigger) -> Result<ExportAttemptRecord, ExportError> {
        let file_name = self.file_name_for(trigger, Utc::now());
        self.execute(trigger, &file_name).await
    }

    async fn force_export(&self, trigger: Trigger) -> ExportAttemptRecord {
        let file_name = self.file_name_for(trigger, Utc::now());
        match self.execute(trigger, &file_name).await {
            Ok(record) => record,
            Err(err) => {
                error!(%trigger, error = %err, "Could not record export outcome");
                ExportAttemptRecord::failure(&file_name, &err.to_string(), trigger)
            }
        }
    }
}
