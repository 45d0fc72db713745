//! Error types for backend socket operations.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by [`SocketSession`](crate::SocketSession) and
/// [`Connector`](crate::Connector) operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// Dialing the backend failed (refused, unreachable, timed out, bad address).
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// No data arrived before the receive deadline.
    #[error("socket receive timed out after {0:?}")]
    Timeout(Duration),

    /// The session was already released.
    #[error("socket session closed")]
    Closed,

    /// Any other socket failure.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// Returns true if this error came from the connect phase.
    pub fn is_connect(&self) -> bool {
        matches!(self, WireError::Connect { .. })
    }
}
