//! Backend configuration (env-driven).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tcpbridge_wire::{DEFAULT_BACKEND_ADDR, LISTEN_BACKLOG};

use crate::listener::ListenerConfig;

/// Backend server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the socket server binds to.
    pub listen_addr: SocketAddr,

    /// Pending-connection backlog.
    pub backlog: u32,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = lookup("BRIDGE_BACKEND_LISTEN_ADDR")
            .map(|v| v.parse())
            .transpose()
            .context("BRIDGE_BACKEND_LISTEN_ADDR must be a socket address (host:port).")?
            .unwrap_or(DEFAULT_BACKEND_ADDR);

        let backlog = lookup("BRIDGE_BACKLOG")
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("BRIDGE_BACKLOG must be a positive integer.")?
            .unwrap_or(LISTEN_BACKLOG);
        anyhow::ensure!(backlog > 0, "BRIDGE_BACKLOG must be a positive integer.");

        let log_level = lookup("BRIDGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            listen_addr,
            backlog,
            log_level,
        })
    }

    pub fn listener(&self) -> ListenerConfig {
        ListenerConfig {
            bind_addr: self.listen_addr,
            backlog: self.backlog,
        }
    }
}
