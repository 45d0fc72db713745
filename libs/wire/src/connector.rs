//! Outbound connections to the backend.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::WireError;
use crate::session::SocketSession;

/// Opens socket sessions. Implementations never retry.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dial the backend and wrap the connection.
    async fn connect(&self) -> Result<SocketSession, WireError>;
}

/// Dials a fixed backend address over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Create a connector for `addr` without a connect timeout.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: None,
        }
    }

    /// Bound each dial by `timeout`.
    pub fn with_timeout(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout: Some(timeout),
        }
    }

    /// The address this connector dials.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn dial(&self) -> io::Result<TcpStream> {
        match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, TcpStream::connect(self.addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
            },
            None => TcpStream::connect(self.addr).await,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<SocketSession, WireError> {
        debug!(backend_addr = %self.addr, "Connecting to backend");

        let stream = self.dial().await.map_err(|source| WireError::Connect {
            addr: self.addr,
            source,
        })?;

        SocketSession::new(stream).map_err(|e| match e {
            WireError::Io(source) => WireError::Connect {
                addr: self.addr,
                source,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connector = TcpConnector::new(addr);
        let session = connector.connect().await.unwrap();
        assert_eq!(session.peer_addr(), addr);
    }

    #[tokio::test]
    async fn test_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = TcpConnector::with_timeout(dead_addr, Duration::from_secs(2));
        let err = connector.connect().await.unwrap_err();
        assert!(err.is_connect());
        assert!(matches!(err, WireError::Connect { addr, .. } if addr == dead_addr));
    }
}
