//! # tcpbridge-wire
//!
//! The contract shared by the gateway and the backend socket server.
//!
//! ## Wire format
//!
//! - Raw bytes, no length prefix and no delimiter
//! - Single-byte text encoding (ISO-8859-1): each byte is one character
//! - A receive returns whatever the OS delivered, up to [`CHUNK_SIZE`] bytes
//!
//! ## Components
//!
//! - [`ConnectionId`]: opaque per-connection token, assigned at accept/connect time
//! - [`SocketSession`]: one live TCP connection with deadline-bounded receive and
//!   idempotent teardown
//! - [`Connector`] / [`TcpConnector`]: dials a backend and yields a session

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

mod codec;
mod connector;
mod error;
mod id;
mod session;

pub use codec::{decode, encode, REPLACEMENT_BYTE};
pub use connector::{Connector, TcpConnector};
pub use error::WireError;
pub use id::ConnectionId;
pub use session::SocketSession;

/// Port the backend socket server listens on.
pub const DEFAULT_BACKEND_PORT: u16 = 11000;

/// Loopback endpoint of the backend socket server.
pub const DEFAULT_BACKEND_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_BACKEND_PORT));

/// Maximum bytes returned by a single receive.
pub const CHUNK_SIZE: usize = 512;

/// Accept backlog for the backend listener.
pub const LISTEN_BACKLOG: u32 = 10;
