use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::{services, state::AppState};
use crate::config::Config;
use crate::events::{ChangeTriggerListener, EventBus};
use crate::ledger::StatusLedger;
use crate::observability::Metrics;
use crate::pipeline::{ExportPipeline, ExportRunner};
use crate::scheduler::ScheduleCoordinator;
use crate::source::MemoryStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes; `/api/v1/export/*` plus the root `/health`
pub fn build_router(state: AppState) -> Router {
    let export = Router::new()
        .route("/status", get(services::latest_status))
        .route("/status/successful", get(services::latest_successful))
        .route("/status/all", get(services::all_statuses))
        .route("/status/by-status", get(services::statuses_by_outcome))
        .route("/statistics", get(services::statistics))
        .route("/manual", post(services::manual_export))
        .route("/health", get(services::export_health))
        .route(
            "/schedule/config",
            get(services::schedule_config).post(services::update_schedule),
        )
        .route("/schedule/toggle", post(services::toggle_schedule))
        .route("/schedule/test", post(services::test_export));

    Router::new()
        .nest("/api/v1/export", export)
        .route("/health", get(services::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Wire the pipeline, listener and scheduler, then serve until a shutdown
/// signal arrives
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let metrics = Arc::new(Metrics::new());

    info!(path = %config.server.ledger_path.display(), "Opening status ledger");
    let ledger = StatusLedger::open(&config.server.ledger_path)?;

    let bus = EventBus::default();
    let store = MemoryStore::from_config(&config.source, bus.clone())?;

    let pipeline = Arc::new(ExportPipeline::from_config(
        &config,
        Arc::new(store),
        ledger.clone(),
        metrics.clone(),
    )?);
    info!(storage = %pipeline.uploader().describe(), "Export pipeline ready");

    let runner: Arc<dyn ExportRunner> = pipeline.clone();
    let scheduler = Arc::new(ScheduleCoordinator::new(
        ledger.clone(),
        runner.clone(),
        metrics.clone(),
        config.schedule.default_cron.clone(),
    ));
    let schedule = scheduler.config().await?;
    info!(
        enabled = schedule.enabled,
        cron = %schedule.cron_expression,
        next = ?schedule.next_run_time,
        "Export schedule loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = ChangeTriggerListener::spawn(&bus, runner, metrics, shutdown_rx.clone());
    let scheduler_task = scheduler.clone().spawn(
        Duration::from_secs(config.schedule.tick_interval_secs),
        shutdown_rx,
    );

    let state = AppState::new(pipeline, scheduler);
    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "exportbox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for task in [listener_task, scheduler_task] {
        if let Err(err) = task.await {
            error!(error = %err, "Background task ended abnormally");
        }
    }

    ledger.persist()?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
