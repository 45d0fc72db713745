//! Backend accept loop and per-connection receive loops.
//!
//! Connections are accepted serially. Each one gets a fresh [`ConnectionId`],
//! is registered, and is served by its own receive task; received text is
//! published on an operator-visible channel.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tcpbridge_wire::{ConnectionId, SocketSession, CHUNK_SIZE, DEFAULT_BACKEND_ADDR, LISTEN_BACKLOG};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument};

use crate::registry::ConnectionRegistry;

/// Configuration for the backend listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Pending-connection backlog.
    pub backlog: u32,
}

impl ListenerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            backlog: LISTEN_BACKLOG,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_ADDR)
    }
}

/// Text received from one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub connection_id: ConnectionId,
    pub text: String,
}

/// Statistics for the backend server.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections whose id collided in the registry.
    pub connections_refused: AtomicU64,
    /// Connections that have closed.
    pub connections_closed: AtomicU64,
    /// Messages received across all connections.
    pub messages_received: AtomicU64,
}

/// The backend socket server.
pub struct BackendServer {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    messages: mpsc::UnboundedSender<ReceivedMessage>,
    stats: Arc<ServerStats>,
}

impl BackendServer {
    /// Bind the listening socket.
    pub async fn bind(
        config: ListenerConfig,
        registry: Arc<ConnectionRegistry>,
        messages: mpsc::UnboundedSender<ReceivedMessage>,
    ) -> io::Result<Self> {
        let socket = if config.bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.bind_addr)?;
        let listener = socket.listen(config.backlog)?;

        info!(
            bind_addr = %listener.local_addr()?,
            backlog = config.backlog,
            "Backend listener bound"
        );

        Ok(Self {
            listener,
            registry,
            messages,
            stats: Arc::new(ServerStats::default()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Accept connections until `shutdown` flips to true, then release every
    /// registered connection.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        info!("Waiting for incoming connections");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            match accepted {
                Ok((stream, peer_addr)) => self.accept(stream, peer_addr, shutdown.clone()).await,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        self.registry.release_all().await;
        info!("Backend listener shut down");
        Ok(())
    }

    async fn accept(
        &self,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) {
        let session = match SocketSession::new(stream) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(peer_addr = %peer_addr, error = %e, "Failed to set up connection");
                return;
            }
        };

        let connection_id = ConnectionId::new();
        self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        info!(connection_id = %connection_id, peer_addr = %peer_addr, "New client connected");

        let registered = self
            .registry
            .insert(connection_id, Arc::clone(&session))
            .await;
        if !registered {
            self.stats.connections_refused.fetch_add(1, Ordering::Relaxed);
            warn!(connection_id = %connection_id, "Connection refused by registry");
        }

        let registry = Arc::clone(&self.registry);
        let messages = self.messages.clone();
        let stats = Arc::clone(&self.stats);

        tokio::spawn(
            async move {
                receive_loop(connection_id, &session, &messages, &stats, shutdown).await;

                if registered {
                    registry.remove(&connection_id).await;
                }
                session.release().await;
                stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                info!("Client disconnected");
            }
            .instrument(tracing::info_span!("connection", connection_id = %connection_id)),
        );
    }
}

async fn receive_loop(
    connection_id: ConnectionId,
    session: &SocketSession,
    messages: &mpsc::UnboundedSender<ReceivedMessage>,
    stats: &ServerStats,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Listening for messages");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let received = tokio::select! {
            received = session.receive(CHUNK_SIZE) => received,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        match received {
            Ok(Some(text)) => {
                stats.messages_received.fetch_add(1, Ordering::Relaxed);
                debug!(text = %text, "Received message");
                // Nobody watching the channel is fine
                let _ = messages.send(ReceivedMessage {
                    connection_id,
                    text,
                });
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Receive failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::default();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:11000");
        assert_eq!(config.backlog, 10);
    }
}
