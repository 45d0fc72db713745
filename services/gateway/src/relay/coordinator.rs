//! Joins the concurrent loops of one session and bounds their shutdown.
//!
//! The coordinator waits until any loop terminates or cancellation is
//! requested, then cancels the rest and gives them a grace period before
//! aborting whatever is still running.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use super::signal::CancellationSignal;
use crate::error::RelayError;

/// Default time granted to loops after cancellation before they are aborted.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// A named loop future.
pub type LoopTask = (&'static str, BoxFuture<'static, Result<(), RelayError>>);

/// Outcome of a coordinated run.
#[derive(Debug, Default)]
pub struct LoopReport {
    /// First loop failure observed. Later failures are logged only.
    pub first_failure: Option<(&'static str, RelayError)>,
    /// Loops that ran to completion (successfully or not).
    pub completed: usize,
    /// Loops aborted after the grace period expired.
    pub aborted: usize,
}

impl LoopReport {
    fn record(&mut self, joined: Result<(&'static str, Result<(), RelayError>), JoinError>) {
        let (name, error) = match joined {
            Ok((name, Ok(()))) => {
                self.completed += 1;
                debug!(loop_name = name, "Loop finished");
                return;
            }
            Ok((name, Err(e))) => {
                self.completed += 1;
                (name, e)
            }
            Err(e) => {
                debug!(error = %e, "Loop task aborted");
                return;
            }
        };

        if self.first_failure.is_none() {
            debug!(loop_name = name, error = %error, "Loop failed");
            self.first_failure = Some((name, error));
        } else {
            debug!(loop_name = name, error = %error, "Additional loop failure");
        }
    }
}

/// Runs a fixed set of loops against a shared cancellation signal.
#[derive(Debug, Clone)]
pub struct LoopCoordinator {
    grace: Duration,
}

impl LoopCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Run `loops` until one ends or `signal` fires, then drain the rest.
    ///
    /// Always leaves `signal` cancelled and every loop finished or aborted.
    pub async fn run(&self, loops: Vec<LoopTask>, signal: &CancellationSignal) -> LoopReport {
        let mut report = LoopReport::default();
        let mut set = JoinSet::new();
        for (name, task) in loops {
            set.spawn(async move {
                let outcome = AssertUnwindSafe(task)
                    .catch_unwind()
                    .await
                    .unwrap_or(Err(RelayError::LoopPanicked(name)));
                (name, outcome)
            });
        }

        if set.is_empty() {
            signal.cancel();
            return report;
        }

        tokio::select! {
            joined = set.join_next() => {
                if let Some(joined) = joined {
                    report.record(joined);
                }
            }
            _ = signal.cancelled() => {}
        }

        // Any terminal event ends the whole session
        signal.cancel();

        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = set.join_next().await {
                report.record(joined);
            }
        })
        .await;

        if drained.is_err() {
            report.aborted = set.len();
            warn!(
                aborted = report.aborted,
                grace_ms = self.grace.as_millis() as u64,
                "Loops still running after grace period, aborting"
            );
            set.shutdown().await;
        }

        report
    }
}

impl Default for LoopCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_GRACE)
    }
}
