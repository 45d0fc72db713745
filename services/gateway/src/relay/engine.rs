//! Relay engine: one backend TCP session serving one inbound connection.
//!
//! State machine per start: `Idle -> Connecting -> Active -> Terminated`.
//!
//! While active, two loops share the session:
//! - relay: backend chunks are forwarded to the inbound channel as `Update`
//! - keep-alive: a timestamped `ping` is written to the backend periodically
//!
//! The loops are joined by the [`LoopCoordinator`]; the socket is released
//! once they are all done, whichever way the session ended.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures_util::FutureExt;
use tcpbridge_wire::{ConnectionId, Connector, CHUNK_SIZE};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::adapter::{InboundChannel, SessionAdapter, UPDATE_METHOD};
use super::coordinator::{LoopCoordinator, LoopTask, DEFAULT_SHUTDOWN_GRACE};
use super::signal::CancellationSignal;
use crate::error::{RelayError, Result};

/// Default time to wait for backend data before the session is considered dead.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default interval between keep-alive pings.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Timing and sizing knobs for a relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Largest chunk read from the backend at once.
    pub chunk_size: usize,
    /// Upper bound on a single backend receive.
    pub receive_timeout: Duration,
    /// Pause between keep-alive pings.
    pub keepalive_interval: Duration,
    /// Time loops get to finish after cancellation.
    pub shutdown_grace: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Lifecycle of a relay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Active,
    Terminated,
}

/// Dials the backend and runs the relay and keep-alive loops.
pub struct RelayEngine {
    connection_id: ConnectionId,
    connector: Arc<dyn Connector>,
    settings: RelaySettings,
    cancellation: CancellationSignal,
    state: watch::Sender<RelayState>,
}

impl RelayEngine {
    pub fn new(
        connection_id: ConnectionId,
        connector: Arc<dyn Connector>,
        settings: RelaySettings,
    ) -> Self {
        let (state, _) = watch::channel(RelayState::Idle);
        Self {
            connection_id,
            connector,
            settings,
            cancellation: CancellationSignal::new(),
            state,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Connect to the backend and relay until the session ends.
    ///
    /// Only connect-phase failures and cancellation are returned. Failures of
    /// the running loops end the session but are logged, not returned, so they
    /// never trigger a retry of the whole attempt.
    pub async fn start(&self, inbound: Arc<dyn InboundChannel>) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(RelayError::Cancelled);
        }

        self.state.send_replace(RelayState::Connecting);

        let connected = tokio::select! {
            result = self.connector.connect() => result,
            _ = self.cancellation.cancelled() => {
                self.state.send_replace(RelayState::Terminated);
                return Err(RelayError::Cancelled);
            }
        };

        let socket = match connected {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.state.send_replace(RelayState::Terminated);
                return Err(e.into());
            }
        };

        info!(
            connection_id = %self.connection_id,
            backend_addr = %socket.peer_addr(),
            "Connected to backend"
        );
        self.state.send_replace(RelayState::Active);

        let adapter = SessionAdapter::new(inbound, Arc::clone(&socket));
        let loops: Vec<LoopTask> = vec![
            (
                "relay",
                relay_loop(
                    adapter.clone(),
                    self.cancellation.clone(),
                    self.settings.clone(),
                )
                .boxed(),
            ),
            (
                "keepalive",
                keepalive_loop(
                    adapter,
                    self.cancellation.clone(),
                    self.settings.keepalive_interval,
                )
                .boxed(),
            ),
        ];

        let report = LoopCoordinator::new(self.settings.shutdown_grace)
            .run(loops, &self.cancellation)
            .await;

        socket.release().await;
        self.state.send_replace(RelayState::Terminated);

        if let Some((loop_name, e)) = &report.first_failure {
            warn!(
                connection_id = %self.connection_id,
                loop_name = *loop_name,
                error = %e,
                "Relay session ended by loop failure"
            );
        }

        info!(
            connection_id = %self.connection_id,
            completed = report.completed,
            aborted = report.aborted,
            "Relay session terminated"
        );

        Ok(())
    }

    /// Request cancellation. Does not wait for the loops to drain.
    pub fn stop(&self) {
        debug!(connection_id = %self.connection_id, "Stopping relay");
        self.cancellation.cancel();
    }
}

/// Forward backend chunks to the inbound channel in receipt order.
async fn relay_loop(
    adapter: SessionAdapter,
    cancellation: CancellationSignal,
    settings: RelaySettings,
) -> Result<()> {
    while !cancellation.is_cancelled() {
        let received = tokio::select! {
            result = adapter
                .socket()
                .receive_timeout(settings.chunk_size, settings.receive_timeout) => result,
            _ = cancellation.cancelled() => break,
        };

        match received {
            Ok(Some(content)) => {
                if let Err(e) = adapter.inbound().send(UPDATE_METHOD, content).await {
                    error!(error = %e, "Something went wrong while relaying a message");
                }
            }
            Ok(None) => {
                info!("Backend closed the connection");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Keep-alive message sent to the backend.
pub fn ping_message() -> String {
    format!(
        "ping {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

/// Ping the backend every `interval` until cancelled.
async fn keepalive_loop(
    adapter: SessionAdapter,
    cancellation: CancellationSignal,
    interval: Duration,
) -> Result<()> {
    while !cancellation.is_cancelled() {
        adapter.socket().send(&ping_message()).await?;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancellation.cancelled() => break,
        }
    }

    Ok(())
}
