//! Gateway error types.

use tcpbridge_wire::WireError;
use thiserror::Error;

/// Failure delivering a message to the inbound (browser) connection.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The inbound connection is gone.
    #[error("inbound connection closed")]
    Closed,

    /// The event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Relay failure.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Backend socket failure, including connect failures and receive timeouts.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Inbound delivery failure.
    #[error(transparent)]
    Inbound(#[from] InboundError),

    /// The session was stopped.
    #[error("relay cancelled")]
    Cancelled,

    /// A relay loop panicked.
    #[error("relay loop '{0}' panicked")]
    LoopPanicked(&'static str),
}

impl RelayError {
    /// Returns true if the backend socket timed out waiting for data.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Wire(WireError::Timeout(_)))
    }

    /// Returns true if dialing the backend failed.
    pub fn is_connect(&self) -> bool {
        matches!(self, RelayError::Wire(e) if e.is_connect())
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
