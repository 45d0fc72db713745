//! tcpbridge backend library.
//!
//! A raw TCP server that tracks every accepted connection under a
//! [`tcpbridge_wire::ConnectionId`], surfaces received text, and lets an
//! operator send directed messages to a single connection.

pub mod config;
pub mod console;
pub mod listener;
pub mod registry;

pub use console::{pong_message, Console, ConsoleInput};
pub use listener::{BackendServer, ListenerConfig, ReceivedMessage, ServerStats};
pub use registry::{ConnectionRegistry, Delivery};
