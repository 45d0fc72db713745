//! Inbound channel abstraction and the session adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tcpbridge_wire::SocketSession;

use crate::error::InboundError;

/// Event name used for relayed backend data.
pub const UPDATE_METHOD: &str = "Update";

/// The single inbound streaming connection, seen only as a message sink.
#[async_trait]
pub trait InboundChannel: Send + Sync + 'static {
    /// Deliver a named message with one payload.
    async fn send(&self, method: &str, payload: String) -> Result<(), InboundError>;
}

/// Server-to-client event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub target: String,
    pub arguments: Vec<String>,
}

impl InboundEvent {
    pub fn new(method: &str, payload: String) -> Self {
        Self {
            target: method.to_string(),
            arguments: vec![payload],
        }
    }
}

/// Pairs one inbound channel with one backend socket session for a relay.
#[derive(Clone)]
pub struct SessionAdapter {
    inbound: Arc<dyn InboundChannel>,
    socket: Arc<SocketSession>,
}

impl SessionAdapter {
    pub fn new(inbound: Arc<dyn InboundChannel>, socket: Arc<SocketSession>) -> Self {
        Self { inbound, socket }
    }

    pub fn inbound(&self) -> &dyn InboundChannel {
        self.inbound.as_ref()
    }

    pub fn socket(&self) -> &SocketSession {
        &self.socket
    }
}
