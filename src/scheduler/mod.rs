//! Recurring exports
//!
//! [`ScheduleCoordinator`] owns the persisted [`ScheduleConfig`] and a
//! background tick. A tick runs the export only when the schedule is enabled
//! and `next_run_time` has passed, and never while a previous scheduled run
//! is still going. Cron expressions are evaluated in UTC.

mod cron;

pub use self::cron::{next_run, validate_expression};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::ExportError;
use crate::humanize::format_duration;
use crate::ledger::{ExportAttemptRecord, RunStatus, ScheduleConfig, StatusLedger, Trigger};
use crate::observability::Metrics;
use crate::pipeline::ExportRunner;

pub const DEFAULT_CRON: &str = "0 0 10 * * SAT";

/// Requested change to the schedule
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleUpdate {
    pub enabled: bool,
    pub cron_expression: Option<String>,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    SkippedRunning,
    SkippedDisabled,
    NotDue,
    Ran(RunStatus),
}

/// Clears the single-flight flag when the tick ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScheduleCoordinator {
    ledger: StatusLedger,
    runner: Arc<dyn ExportRunner>,
    metrics: Arc<Metrics>,
    default_cron: String,
    running: AtomicBool,
    /// Serializes read-modify-write of the schedule record
    record_lock: Mutex<()>,
}

impl ScheduleCoordinator {
    pub fn new(
        ledger: StatusLedger,
        runner: Arc<dyn ExportRunner>,
        metrics: Arc<Metrics>,
        default_cron: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            runner,
            metrics,
            default_cron: default_cron.into(),
            running: AtomicBool::new(false),
            record_lock: Mutex::new(()),
        }
    }

    fn load_or_create(&self) -> Result<ScheduleConfig, ExportError> {
        if let Some(schedule) = self.ledger.load_schedule()? {
            return Ok(schedule);
        }
        let schedule = ScheduleConfig::new(&self.default_cron);
        self.ledger.save_schedule(&schedule)?;
        info!(cron = %schedule.cron_expression, "Created default export schedule (disabled)");
        Ok(schedule)
    }

    /// Store a fresh `next_run_time`, or clear it if the expression has no
    /// future occurrence
    fn recompute_next_run(schedule: &mut ScheduleConfig, from: DateTime<Utc>) {
        match next_run(&schedule.cron_expression, from) {
            Ok(next) => schedule.next_run_time = Some(next),
            Err(err) => {
                warn!(cron = %schedule.cron_expression, error = %err, "Cannot compute next run");
                schedule.next_run_time = None;
            }
        }
    }

    /// Current schedule, created on first access. An enabled schedule whose
    /// next run is missing or already past gets a fresh one.
    pub async fn config(&self) -> Result<ScheduleConfig, ExportError> {
        let _lock = self.record_lock.lock().await;
        let mut schedule = self.load_or_create()?;

        let now = Utc::now();
        let stale = schedule.next_run_time.is_none_or(|next| next < now);
        if schedule.enabled && stale {
            Self::recompute_next_run(&mut schedule, now);
            schedule.updated_at = now;
            self.ledger.save_schedule(&schedule)?;
            debug!(next = ?schedule.next_run_time, "Refreshed stale next run time");
        }

        Ok(schedule)
    }

    /// Apply an update. An invalid expression is ignored (the old one is
    /// kept) rather than rejected.
    pub async fn update_config(&self, update: ScheduleUpdate) -> Result<ScheduleConfig, ExportError> {
        let _lock = self.record_lock.lock().await;
        let mut schedule = self.load_or_create()?;
        let now = Utc::now();

        let mut expression_changed = false;
        if let Some(expression) = update.cron_expression.as_deref() {
            let expression = expression.trim();
            match validate_expression(expression) {
                Ok(_) => {
                    expression_changed = expression != schedule.cron_expression;
                    schedule.cron_expression = expression.to_string();
                }
                Err(err) => warn!(
                    requested = expression,
                    kept = %schedule.cron_expression,
                    error = %err,
                    "Ignoring invalid cron expression"
                ),
            }
        }

        schedule.enabled = update.enabled;
        // A new expression invalidates the stored time even while disabled
        if schedule.enabled || expression_changed {
            Self::recompute_next_run(&mut schedule, now);
        }
        schedule.updated_at = now;
        self.ledger.save_schedule(&schedule)?;

        info!(
            enabled = schedule.enabled,
            cron = %schedule.cron_expression,
            next = ?schedule.next_run_time,
            "Export schedule updated"
        );
        Ok(schedule)
    }

    /// Enable or disable. Disabling leaves the timestamps as they were.
    pub async fn toggle(&self, enabled: bool) -> Result<ScheduleConfig, ExportError> {
        let _lock = self.record_lock.lock().await;
        let mut schedule = self.load_or_create()?;
        let now = Utc::now();

        schedule.enabled = enabled;
        if enabled {
            Self::recompute_next_run(&mut schedule, now);
        }
        schedule.updated_at = now;
        self.ledger.save_schedule(&schedule)?;

        info!(enabled, next = ?schedule.next_run_time, "Export schedule toggled");
        Ok(schedule)
    }

    /// Evaluate the schedule at `now` and run the export if it is due
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickOutcome, ExportError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous scheduled export still running, skipping tick");
            return Ok(TickOutcome::SkippedRunning);
        }
        let _guard = RunningGuard(&self.running);

        {
            let _lock = self.record_lock.lock().await;
            let mut schedule = self.load_or_create()?;

            if !schedule.enabled {
                return Ok(TickOutcome::SkippedDisabled);
            }

            let Some(next) = schedule.next_run_time else {
                Self::recompute_next_run(&mut schedule, now);
                schedule.updated_at = now;
                self.ledger.save_schedule(&schedule)?;
                return Ok(TickOutcome::NotDue);
            };

            if now < next {
                return Ok(TickOutcome::NotDue);
            }

            schedule.total_scheduled_runs += 1;
            schedule.last_run_status = Some(RunStatus::InProgress);
            schedule.updated_at = now;
            self.ledger.save_schedule(&schedule)?;
        }

        info!(due = %now, "Running scheduled export");
        self.metrics.scheduled_run();
        let started = Instant::now();

        let (status, error_message) = match self.runner.run(Trigger::Scheduled).await {
            Ok(record) if record.is_success() => (RunStatus::Success, None),
            Ok(record) => (
                RunStatus::Failed,
                Some(record.error_message.unwrap_or_else(|| "export failed".to_string())),
            ),
            Err(err) => (RunStatus::Failed, Some(err.to_string())),
        };
        let elapsed = started.elapsed();

        let _lock = self.record_lock.lock().await;
        // Reload: the schedule may have been edited while the export ran
        let mut schedule = self.load_or_create()?;
        let finished = now + chrono::Duration::from_std(elapsed).unwrap_or_default();

        schedule.last_run_time = Some(now);
        schedule.last_run_status = Some(status);
        match status {
            RunStatus::Success => schedule.successful_runs += 1,
            _ => schedule.failed_runs += 1,
        }
        schedule.last_error_message = error_message;
        if schedule.enabled {
            Self::recompute_next_run(&mut schedule, finished);
        }
        schedule.updated_at = finished;
        self.ledger.save_schedule(&schedule)?;

        info!(
            status = ?status,
            took = %format_duration(elapsed),
            next = ?schedule.next_run_time,
            "Scheduled export finished"
        );
        Ok(TickOutcome::Ran(status))
    }

    /// Run an export now without touching the schedule counters
    pub async fn trigger_test_export(&self) -> ExportAttemptRecord {
        info!("Test export requested");
        self.runner.force_export(Trigger::Test).await
    }

    /// Drive [`tick`](Self::tick) every `interval` until `shutdown` flips
    /// to `true`. Each tick runs on its own task so a long export does not
    /// hold up the loop; overlapping ticks hit the single-flight guard.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = %format_duration(interval), "Export scheduler started");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let coordinator = Arc::clone(&self);
                        tokio::spawn(async move {
                            match coordinator.tick(Utc::now()).await {
                                Ok(TickOutcome::Ran(status)) => {
                                    debug!(status = ?status, "Scheduled tick ran an export");
                                }
                                Ok(outcome) => debug!(outcome = ?outcome, "Scheduled tick"),
                                Err(err) => error!(error = %err, "Scheduled tick failed"),
                            }
                        });
                    }
                }
            }
            info!("Export scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ExportStatus;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct StubRunner {
        succeed: bool,
        calls: AtomicU32,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl StubRunner {
        fn new(succeed: bool) -> Self {
            Self {
                succeed,
                calls: AtomicU32::new(0),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl ExportRunner for StubRunner {
        async fn run(&self, trigger: Trigger) -> Result<ExportAttemptRecord, ExportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((started, release)) = &self.gate {
                started.notify_one();
                release.notified().await;
            }
            if self.succeed {
                Ok(ExportAttemptRecord::success(
                    "mobile-export.json",
                    "http://x/mobile-export.json",
                    &Default::default(),
                    10,
                    trigger,
                ))
            } else {
                Ok(ExportAttemptRecord::failure("mobile-export.json", "HTTP 503", trigger))
            }
        }

        async fn force_export(&self, trigger: Trigger) -> ExportAttemptRecord {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ExportAttemptRecord::failure("mobile-export_test.json", "stub", trigger)
        }
    }

    fn coordinator(runner: Arc<StubRunner>) -> (ScheduleCoordinator, TempDir) {
        let temp = TempDir::new().unwrap();
        let ledger = StatusLedger::open(temp.path().join("ledger")).unwrap();
        let coordinator =
            ScheduleCoordinator::new(ledger, runner, Arc::new(Metrics::new()), DEFAULT_CRON);
        (coordinator, temp)
    }

    #[tokio::test]
    async fn test_default_schedule_created_disabled() {
        let (coordinator, _temp) = coordinator(Arc::new(StubRunner::new(true)));

        let schedule = coordinator.config().await.unwrap();
        assert!(!schedule.enabled);
        assert_eq!(schedule.cron_expression, DEFAULT_CRON);
        assert!(schedule.next_run_time.is_none());

        // Same record on the next read
        assert_eq!(coordinator.config().await.unwrap().id, schedule.id);
    }

    #[tokio::test]
    async fn test_toggle() {
        let (coordinator, _temp) = coordinator(Arc::new(StubRunner::new(true)));

        let enabled = coordinator.toggle(true).await.unwrap();
        let next = enabled.next_run_time.unwrap();
        assert!(next > Utc::now());

        let disabled = coordinator.toggle(false).await.unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.next_run_time, Some(next));
    }

    #[tokio::test]
    async fn test_expression_change_while_disabled_moves_next_run() {
        use chrono::Timelike;

        let (coordinator, _temp) = coordinator(Arc::new(StubRunner::new(true)));
        coordinator.toggle(true).await.unwrap();
        coordinator.toggle(false).await.unwrap();

        let updated = coordinator
            .update_config(ScheduleUpdate {
                enabled: false,
                cron_expression: Some("0 0 6 * * *".to_string()),
            })
            .await
            .unwrap();
        assert!(!updated.enabled);
        let next = updated.next_run_time.unwrap();
        assert!(next > Utc::now());
        assert_eq!((next.hour(), next.minute()), (6, 0));

        // Re-enabling later fires on the new expression
        let enabled = coordinator.toggle(true).await.unwrap();
        assert_eq!(enabled.next_run_time.unwrap().hour(), 6);
        assert_eq!(coordinator.config().await.unwrap().cron_expression, "0 0 6 * * *");
    }

    #[tokio::test]
    async fn test_invalid_expression_keeps_previous() {
        let (coordinator, _temp) = coordinator(Arc::new(StubRunner::new(true)));

        let updated = coordinator
            .update_config(ScheduleUpdate {
                enabled: true,
                cron_expression: Some("not a cron".to_string()),
            })
            .await
            .unwrap();
        assert!(updated.enabled);
        assert_eq!(updated.cron_expression, DEFAULT_CRON);
        assert!(updated.next_run_time.is_some());

        let updated = coordinator
            .update_config(ScheduleUpdate {
                enabled: true,
                cron_expression: Some("0 0 6 * * *".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(updated.cron_expression, "0 0 6 * * *");
    }

    #[tokio::test]
    async fn test_tick_disabled_and_not_due() {
        let runner = Arc::new(StubRunner::new(true));
        let (coordinator, _temp) = coordinator(runner.clone());

        assert_eq!(coordinator.tick(Utc::now()).await.unwrap(), TickOutcome::SkippedDisabled);

        coordinator.toggle(true).await.unwrap();
        assert_eq!(coordinator.tick(Utc::now()).await.unwrap(), TickOutcome::NotDue);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_due_tick_updates_bookkeeping() {
        let runner = Arc::new(StubRunner::new(true));
        let (coordinator, _temp) = coordinator(runner.clone());
        let next = coordinator.toggle(true).await.unwrap().next_run_time.unwrap();

        let due = next + chrono::Duration::seconds(1);
        assert_eq!(
            coordinator.tick(due).await.unwrap(),
            TickOutcome::Ran(RunStatus::Success)
        );

        let schedule = coordinator.ledger.load_schedule().unwrap().unwrap();
        assert_eq!(schedule.total_scheduled_runs, 1);
        assert_eq!(schedule.successful_runs, 1);
        assert_eq!(schedule.failed_runs, 0);
        assert_eq!(schedule.last_run_time, Some(due));
        assert_eq!(schedule.last_run_status, Some(RunStatus::Success));
        assert!(schedule.last_error_message.is_none());
        assert!(schedule.next_run_time.unwrap() > due);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_counted() {
        let runner = Arc::new(StubRunner::new(false));
        let (coordinator, _temp) = coordinator(runner);
        let next = coordinator.toggle(true).await.unwrap().next_run_time.unwrap();

        let outcome = coordinator.tick(next).await.unwrap();
        assert_eq!(outcome, TickOutcome::Ran(RunStatus::Failed));

        let schedule = coordinator.ledger.load_schedule().unwrap().unwrap();
        assert_eq!(schedule.failed_runs, 1);
        assert_eq!(schedule.last_error_message.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runner = Arc::new(StubRunner {
            succeed: true,
            calls: AtomicU32::new(0),
            gate: Some((started.clone(), release.clone())),
        });
        let (coordinator, _temp) = coordinator(runner.clone());
        let coordinator = Arc::new(coordinator);
        let next = coordinator.toggle(true).await.unwrap().next_run_time.unwrap();

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.tick(next).await }
        });
        started.notified().await;

        assert_eq!(coordinator.tick(next).await.unwrap(), TickOutcome::SkippedRunning);

        release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), TickOutcome::Ran(RunStatus::Success));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        // Guard released: a later tick is evaluated normally
        assert_eq!(coordinator.tick(next).await.unwrap(), TickOutcome::NotDue);
    }

    #[tokio::test]
    async fn test_stale_next_run_is_refreshed_on_read() {
        let (coordinator, _temp) = coordinator(Arc::new(StubRunner::new(true)));
        coordinator.toggle(true).await.unwrap();

        let mut schedule = coordinator.ledger.load_schedule().unwrap().unwrap();
        schedule.next_run_time = Some(Utc::now() - chrono::Duration::days(3));
        coordinator.ledger.save_schedule(&schedule).unwrap();

        let refreshed = coordinator.config().await.unwrap();
        assert!(refreshed.next_run_time.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_test_export_leaves_counters_alone() {
        let runner = Arc::new(StubRunner::new(true));
        let (coordinator, _temp) = coordinator(runner.clone());
        coordinator.toggle(true).await.unwrap();

        let record = coordinator.trigger_test_export().await;
        assert_eq!(record.trigger, Trigger::Test);
        assert_eq!(record.status, ExportStatus::Failed);

        let schedule = coordinator.config().await.unwrap();
        assert_eq!(schedule.total_scheduled_runs, 0);
        assert!(schedule.last_run_time.is_none());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_stops_on_shutdown() {
        let (coordinator, _temp) = coordinator(Arc::new(StubRunner::new(true)));
        let (tx, shutdown) = watch::channel(false);
        let handle = Arc::new(coordinator).spawn(Duration::from_secs(60), shutdown);

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
