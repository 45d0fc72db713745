//! Registry of accepted backend connections.

use std::collections::HashMap;
use std::sync::Arc;

use tcpbridge_wire::{ConnectionId, SocketSession, WireError};
use tokio::sync::RwLock;
use tracing::debug;

/// Result of a directed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was written to the connection.
    Sent,
    /// No connection with that id is registered.
    UnknownConnection,
}

/// Active connections keyed by the id assigned at accept time.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<SocketSession>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns false if the id is already present, in
    /// which case the existing entry is kept.
    pub async fn insert(&self, connection_id: ConnectionId, session: Arc<SocketSession>) -> bool {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&connection_id) {
            return false;
        }
        connections.insert(connection_id, session);
        debug!(connection_id = %connection_id, active = connections.len(), "Connection registered");
        true
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Arc<SocketSession>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub async fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<SocketSession>> {
        self.connections.write().await.remove(connection_id)
    }

    /// Write `message` to one connection.
    pub async fn send_to(
        &self,
        connection_id: &ConnectionId,
        message: &str,
    ) -> Result<Delivery, WireError> {
        let Some(session) = self.get(connection_id).await else {
            return Ok(Delivery::UnknownConnection);
        };
        session.send(message).await?;
        Ok(Delivery::Sent)
    }

    /// Connected ids in a stable order.
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Remove and release every connection.
    pub async fn release_all(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (_, session) in drained {
            session.release().await;
        }
    }
}
