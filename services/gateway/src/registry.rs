//! Registry of relays keyed by inbound connection.

use std::collections::HashMap;
use std::sync::Arc;

use tcpbridge_wire::{ConnectionId, Connector};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::relay::{RelayEngine, RelaySettings, ResilientRelay, RetryPolicy};

/// Builds one [`ResilientRelay`] per inbound connection.
pub struct RelayFactory {
    connector: Arc<dyn Connector>,
    settings: RelaySettings,
    policy: RetryPolicy,
}

impl RelayFactory {
    pub fn new(connector: Arc<dyn Connector>, settings: RelaySettings, policy: RetryPolicy) -> Self {
        Self {
            connector,
            settings,
            policy,
        }
    }

    pub fn create(&self, connection_id: ConnectionId) -> ResilientRelay {
        let engine = RelayEngine::new(
            connection_id,
            Arc::clone(&self.connector),
            self.settings.clone(),
        );
        ResilientRelay::new(engine, self.policy.clone())
    }
}

/// Active relays keyed by connection id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Arc<ResilientRelay>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay. Returns false if the id is already taken.
    pub async fn insert(&self, connection_id: ConnectionId, relay: Arc<ResilientRelay>) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&connection_id) {
            return false;
        }
        sessions.insert(connection_id, relay);
        debug!(connection_id = %connection_id, active = sessions.len(), "Relay registered");
        true
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Arc<ResilientRelay>> {
        self.sessions.read().await.get(connection_id).cloned()
    }

    /// Remove a relay, returning it if it was registered.
    pub async fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<ResilientRelay>> {
        self.sessions.write().await.remove(connection_id)
    }

    /// Remove and stop the relay for `connection_id`.
    ///
    /// Returns false (and does nothing) if no such relay is registered, so a
    /// repeated disconnect never stops twice.
    pub async fn stop(&self, connection_id: &ConnectionId) -> bool {
        match self.remove(connection_id).await {
            Some(relay) => {
                relay.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every registered relay.
    pub async fn stop_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        info!(count = drained.len(), "Stopping all relays");
        for (_, relay) in drained {
            relay.stop();
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
