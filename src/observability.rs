//! Observability: in-process counters and tracing setup

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Counters for export activity
#[derive(Debug, Default)]
pub struct Metrics {
    exports_succeeded: AtomicU64,
    exports_failed: AtomicU64,
    upload_retries: AtomicU64,
    change_triggers: AtomicU64,
    scheduled_runs: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export_succeeded(&self) {
        self.exports_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "exports_succeeded", "Metric incremented");
    }

    pub fn export_failed(&self) {
        self.exports_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "exports_failed", "Metric incremented");
    }

    pub fn upload_retried(&self) {
        self.upload_retries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "upload_retries", "Metric incremented");
    }

    pub fn change_triggered(&self) {
        self.change_triggers.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "change_triggers", "Metric incremented");
    }

    pub fn scheduled_run(&self) {
        self.scheduled_runs.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "scheduled_runs", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            exports_succeeded: self.exports_succeeded.load(Ordering::Relaxed),
            exports_failed: self.exports_failed.load(Ordering::Relaxed),
            upload_retries: self.upload_retries.load(Ordering::Relaxed),
            change_triggers: self.change_triggers.load(Ordering::Relaxed),
            scheduled_runs: self.scheduled_runs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub exports_succeeded: u64,
    pub exports_failed: u64,
    pub upload_retries: u64,
    pub change_triggers: u64,
    pub scheduled_runs: u64,
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.export_succeeded();
        metrics.export_succeeded();
        metrics.export_failed();
        metrics.upload_retried();
        metrics.change_triggered();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.exports_succeeded, 2);
        assert_eq!(snapshot.exports_failed, 1);
        assert_eq!(snapshot.upload_retries, 1);
        assert_eq!(snapshot.change_triggers, 1);
        assert_eq!(snapshot.scheduled_runs, 0);
    }
}
