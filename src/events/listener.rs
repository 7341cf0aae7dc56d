use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{EventBus, TransactionEvent};
use crate::humanize::format_duration;
use crate::ledger::Trigger;
use crate::observability::Metrics;
use crate::pipeline::ExportRunner;

/// Runs an export after committed changes
///
/// Exports happen off the listener task so the publisher never waits on
/// one. Changes that arrive while an export is in flight are folded into a
/// single trailing export, so at most one change-triggered export runs at
/// a time. Nothing from the export chain escapes: outcomes are logged and
/// recorded by the pipeline.
pub struct ChangeTriggerListener;

impl ChangeTriggerListener {
    /// Subscribe now and process events until `shutdown` flips to `true`
    /// or the bus closes.
    pub fn spawn(
        bus: &EventBus,
        runner: Arc<dyn ExportRunner>,
        metrics: Arc<Metrics>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut events = bus.subscribe();
        let trigger = Arc::new(ExportTrigger::new(runner));

        tokio::spawn(async move {
            info!("Change trigger listener started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    received = events.recv() => match received {
                        Ok(TransactionEvent::Committed(event)) => {
                            debug!(
                                entity = %event.entity_kind,
                                operation = %event.operation,
                                id = %event.entity_id,
                                "Change committed"
                            );
                            metrics.change_triggered();
                            trigger.request(1);
                        }
                        Ok(TransactionEvent::RolledBack(event)) => {
                            warn!(
                                entity = %event.entity_kind,
                                operation = %event.operation,
                                id = %event.entity_id,
                                "Transaction rolled back, skipping export"
                            );
                        }
                        // Dropped events may have been commits
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Change listener fell behind, exporting current state");
                            trigger.request(skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            info!("Change trigger listener stopped");
        })
    }
}

/// Single-flight export with a trailing rerun
struct ExportTrigger {
    runner: Arc<dyn ExportRunner>,
    pending: AtomicU64,
    running: AtomicBool,
}

impl ExportTrigger {
    fn new(runner: Arc<dyn ExportRunner>) -> Self {
        Self {
            runner,
            pending: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    fn request(self: &Arc<Self>, changes: u64) {
        self.pending.fetch_add(changes, Ordering::AcqRel);
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tokio::spawn(Arc::clone(self).drain());
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            loop {
                let changes = self.pending.swap(0, Ordering::AcqRel);
                if changes == 0 {
                    break;
                }
                export_after_change(self.runner.as_ref(), changes).await;
            }

            self.running.store(false, Ordering::Release);
            // A request may have landed between the last swap and the store
            if self.pending.load(Ordering::Acquire) == 0
                || self
                    .running
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                break;
            }
        }
    }
}

async fn export_after_change(runner: &dyn ExportRunner, changes: u64) {
    let started = Instant::now();
    debug!(changes, "Export triggered by change");

    match runner.run(Trigger::ChangeEvent).await {
        Ok(record) if record.is_success() => info!(
            changes,
            took = %format_duration(started.elapsed()),
            "Change-triggered export succeeded"
        ),
        Ok(record) => warn!(
            changes,
            took = %format_duration(started.elapsed()),
            error = record.error_message.as_deref().unwrap_or("unknown"),
            "Change-triggered export failed"
        ),
        Err(err) => error!(
            changes,
            took = %format_duration(started.elapsed()),
            error = %err,
            "Change-triggered export could not be recorded"
        ),
    }
}
