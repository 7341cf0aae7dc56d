use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::snapshot::models::RecordCounts;

/// Outcome stored on an attempt record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Success,
    Failed,
    InProgress,
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExportStatus::Success => "SUCCESS",
            ExportStatus::Failed => "FAILED",
            ExportStatus::InProgress => "IN_PROGRESS",
        };
        f.write_str(label)
    }
}

impl FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUCCESS" => Ok(ExportStatus::Success),
            "FAILED" => Ok(ExportStatus::Failed),
            "IN_PROGRESS" => Ok(ExportStatus::InProgress),
            other => Err(format!("unknown export status '{other}'")),
        }
    }
}

/// What started an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    ChangeEvent,
    Scheduled,
    Manual,
    Test,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trigger::ChangeEvent => "change_event",
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
            Trigger::Test => "test",
        };
        f.write_str(label)
    }
}

/// One export attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportAttemptRecord {
    pub id: Uuid,
    pub export_timestamp: DateTime<Utc>,
    pub status: ExportStatus,
    pub destination_url: Option<String>,
    pub file_name: String,
    pub record_count: Option<usize>,
    pub cession_count: Option<usize>,
    pub payment_count: Option<usize>,
    pub workplace_count: Option<usize>,
    pub job_count: Option<usize>,
    pub file_size_bytes: Option<u64>,
    pub error_message: Option<String>,
    pub trigger: Trigger,
    pub created_at: DateTime<Utc>,
}

impl ExportAttemptRecord {
    pub fn success(
        file_name: &str,
        url: &str,
        counts: &RecordCounts,
        file_size_bytes: u64,
        trigger: Trigger,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            export_timestamp: now,
            status: ExportStatus::Success,
            destination_url: Some(url.to_string()),
            file_name: file_name.to_string(),
            record_count: Some(counts.clients),
            cession_count: Some(counts.cessions),
            payment_count: Some(counts.payments),
            workplace_count: Some(counts.workplaces),
            job_count: Some(counts.jobs),
            file_size_bytes: Some(file_size_bytes),
            error_message: None,
            trigger,
            created_at: now,
        }
    }

    pub fn failure(file_name: &str, error_message: &str, trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            export_timestamp: now,
            status: ExportStatus::Failed,
            destination_url: None,
            file_name: file_name.to_string(),
            record_count: None,
            cession_count: None,
            payment_count: None,
            workplace_count: None,
            job_count: None,
            file_size_bytes: None,
            error_message: Some(error_message.to_string()),
            trigger,
            created_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExportStatus::Success
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStatistics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub last_successful_at: Option<DateTime<Utc>>,
}

/// Status of the most recent scheduled run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
    InProgress,
}

/// The single recurring-export schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub id: Uuid,
    pub enabled: bool,
    pub cron_expression: String,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub last_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_scheduled_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
}

impl ScheduleConfig {
    /// Fresh, disabled schedule
    pub fn new(cron_expression: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            enabled: false,
            cron_expression: cron_expression.to_string(),
            last_run_time: None,
            next_run_time: None,
            last_run_status: None,
            last_error_message: None,
            created_at: now,
            updated_at: now,
            total_scheduled_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
        }
    }
}
