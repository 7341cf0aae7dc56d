use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::collections::HashMap;

use super::{
    error::ApiError,
    models::{ExportHealthResponse, HealthResponse, StatusQuery, ToggleRequest},
    state::AppState,
};
use crate::ledger::{ExportStatus, Trigger};
use crate::pipeline::ExportRunner;
use crate::scheduler::ScheduleUpdate;

/// Most recent attempt (GET /api/v1/export/status)
pub async fn latest_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .pipeline
        .ledger()
        .latest()?
        .ok_or_else(|| ApiError::NotFound("no export attempts recorded".to_string()))?;

    Ok(Json(record))
}

/// Most recent successful attempt (GET /api/v1/export/status/successful)
pub async fn latest_successful(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .pipeline
        .ledger()
        .latest_successful()?
        .ok_or_else(|| ApiError::NotFound("no successful export recorded".to_string()))?;

    Ok(Json(record))
}

/// Full history, newest first (GET /api/v1/export/status/all)
pub async fn all_statuses(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.ledger().all()?))
}

/// History filtered by outcome (GET /api/v1/export/status/by-status?status=FAILED)
pub async fn statuses_by_outcome(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status: ExportStatus = query.status.parse().map_err(ApiError::InvalidPayload)?;
    Ok(Json(state.pipeline.ledger().by_outcome(status)?))
}

/// Totals over the whole history (GET /api/v1/export/statistics)
pub async fn statistics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.ledger().statistics()?))
}

/// Run an export now (POST /api/v1/export/manual)
///
/// Always answers 200 with the attempt record; a failed export is reported
/// through the record's status, not the HTTP status.
pub async fn manual_export(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.force_export(Trigger::Manual).await)
}

/// Pipeline readiness (GET /api/v1/export/health)
pub async fn export_health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.pipeline.snapshots().health().await;
    let latest_status = state
        .pipeline
        .ledger()
        .latest()
        .ok()
        .flatten()
        .map(|record| record.status);

    let response = ExportHealthResponse {
        healthy: snapshot.healthy,
        snapshot,
        storage: state.pipeline.uploader().describe(),
        latest_status,
    };

    let status_code = if response.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response))
}

/// GET /api/v1/export/schedule/config
pub async fn schedule_config(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.config().await?))
}

/// POST /api/v1/export/schedule/config
///
/// An unparseable cron expression is ignored and the previous one kept;
/// the response shows which expression is in effect.
pub async fn update_schedule(
    State(state): State<AppState>,
    Json(update): Json<ScheduleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.update_config(update).await?))
}

/// POST /api/v1/export/schedule/toggle
pub async fn toggle_schedule(
    State(state): State<AppState>,
    Json(request): Json<ToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.toggle(request.enabled).await?))
}

/// POST /api/v1/export/schedule/test
pub async fn test_export(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.trigger_test_export().await)
}

/// Health check endpoint (GET /health)
///
/// Returns 503 if the ledger or the data source is unusable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let ledger = match state.pipeline.ledger().health_check() {
        Ok(()) => "healthy".to_string(),
        Err(err) => format!("unhealthy: {err}"),
    };
    components.insert("ledger".to_string(), ledger);

    let snapshot = state.pipeline.snapshots().health().await;
    let source = match (snapshot.healthy, snapshot.message) {
        (true, _) => "healthy".to_string(),
        (false, Some(message)) => format!("unhealthy: {message}"),
        (false, None) => "unhealthy".to_string(),
    };
    components.insert("source".to_string(), source);
    components.insert("storage".to_string(), state.pipeline.uploader().describe());

    let all_healthy = components
        .iter()
        .filter(|(name, _)| name.as_str() != "storage")
        .all(|(_, status)| status == "healthy");

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
