//! Request and response bodies for the export API
//!
//! Ledger and schedule entities are returned as stored
//! ([`ExportAttemptRecord`](crate::ledger::ExportAttemptRecord),
//! [`ScheduleConfig`](crate::ledger::ScheduleConfig)); only the wrappers
//! that have no ledger counterpart live here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ledger::ExportStatus;
use crate::observability::MetricsSnapshot;
use crate::snapshot::SnapshotHealth;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}

/// `GET /api/v1/export/health`
#[derive(Debug, Serialize)]
pub struct ExportHealthResponse {
    pub healthy: bool,
    pub snapshot: SnapshotHealth,
    pub storage: String,
    pub latest_status: Option<ExportStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}
