//! Bounded retry with exponential backoff and jitter
//!
//! Every remote-facing operation in the pipeline goes through
//! [`run_with_retry`]. The delay before retry `n` is
//! `base_delay * 2^(n-1) * jitter`, jitter drawn uniformly from `[0.5, 1.5]`,
//! capped at [`RetryPolicy::max_delay`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicyConfig;
use crate::humanize::format_duration;

/// Upper bound on a single backoff sleep
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Called once with the attempt number that produced the final error
    fn record_attempt(&mut self, _attempt: u32) {}
}

/// Default classifier: trust the error's own tag
pub fn is_retryable<E: Retryable>(error: &E) -> bool {
    error.is_retryable()
}

#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct RetryPolicy {
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_secs(1))]
    pub base_delay: Duration,
    #[builder(default = MAX_BACKOFF)]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(value: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: value.max_attempts,
            base_delay: Duration::from_millis(value.base_delay_ms),
            max_delay: Duration::from_millis(value.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let exponential = self.base_delay.saturating_mul(1u32 << exponent);
        let jittered = Duration::try_from_secs_f64(exponential.as_secs_f64() * jitter.clamp(0.5, 1.5))
            .unwrap_or(Duration::MAX);
        jittered.min(self.max_delay)
    }
}

fn jitter() -> f64 {
    rand::thread_rng().gen_range(0.5..=1.5)
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is reached. The closure receives the 1-based
/// attempt number.
pub async fn run_with_retry<T, E, F, Fut, C>(
    operation_name: &str,
    policy: &RetryPolicy,
    classify: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(operation = operation_name, attempt, max_attempts, "Attempt starting");

        match operation(attempt).await {
            Ok(value) => {
                let elapsed = started.elapsed();
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt,
                        retried_after_failures = attempt - 1,
                        elapsed = %format_duration(elapsed),
                        "Operation succeeded after retry"
                    );
                } else {
                    debug!(
                        operation = operation_name,
                        elapsed = %format_duration(elapsed),
                        "Operation succeeded"
                    );
                }
                return Ok(value);
            }
            Err(mut err) => {
                let retryable = classify(&err);

                if !retryable || attempt >= max_attempts {
                    err.record_attempt(attempt);
                    error!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        retryable,
                        elapsed = %format_duration(started.elapsed()),
                        error = %err,
                        "Operation failed"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(attempt, jitter());
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay = %format_duration(delay),
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
