//! Bounded retry with exponential backoff around relay start.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::error;

use super::signal::CancellationSignal;
use crate::error::{RelayError, Result};

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay unit; retry `k` waits `base * 2^k`.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Calculate the delay before retry number `retry` (starting at 1).
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(retry as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Retry policy: how many times and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Name used in retry logs.
    pub name: String,

    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Delay schedule.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            name: "backend-relay".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Run `operation`, retrying any failure up to `policy.max_retries` times.
///
/// Cancellation is never retried: a [`RelayError::Cancelled`] result, or a
/// cancellation observed during a backoff sleep, returns immediately. When
/// retries are exhausted the last failure is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancellation: &CancellationSignal,
    operation_key: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        let e = match operation().await {
            Ok(value) => return Ok(value),
            Err(RelayError::Cancelled) => return Err(RelayError::Cancelled),
            Err(e) => e,
        };

        if retry >= policy.max_retries {
            return Err(e);
        }
        retry += 1;

        let delay = policy.backoff.delay(retry);
        error!(
            retry,
            policy = %policy.name,
            operation = operation_key,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "Retry {} of {} at {} due to: {}",
            retry,
            policy.name,
            operation_key,
            e
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancellation.cancelled() => return Err(RelayError::Cancelled),
        }
    }
}
