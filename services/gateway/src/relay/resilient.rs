//! Relay engine wrapped in the retry policy.

use std::sync::Arc;

use tcpbridge_wire::ConnectionId;

use super::adapter::InboundChannel;
use super::engine::RelayEngine;
use super::retry::{retry_with_backoff, RetryPolicy};
use crate::error::Result;

/// A [`RelayEngine`] whose start is retried with backoff.
///
/// Stopping is forwarded directly and never delayed.
pub struct ResilientRelay {
    engine: RelayEngine,
    policy: RetryPolicy,
}

impl ResilientRelay {
    pub fn new(engine: RelayEngine, policy: RetryPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.engine.connection_id()
    }

    pub fn engine(&self) -> &RelayEngine {
        &self.engine
    }

    /// Start the relay, retrying the whole connect-and-run attempt on failure.
    pub async fn start(&self, inbound: Arc<dyn InboundChannel>) -> Result<()> {
        let engine = &self.engine;
        let inbound = &inbound;
        let key = engine.connection_id().to_string();

        retry_with_backoff(&self.policy, engine.cancellation(), &key, move || {
            engine.start(Arc::clone(inbound))
        })
        .await
    }

    pub fn stop(&self) {
        self.engine.stop();
    }
}
