//! Gateway configuration (env-driven).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tcpbridge_wire::DEFAULT_BACKEND_ADDR;

use crate::relay::{BackoffPolicy, RelaySettings, RetryPolicy, DEFAULT_MAX_RETRIES};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: SocketAddr,

    /// Backend socket server to dial for every inbound connection.
    pub backend_addr: SocketAddr,

    /// Browser origin allowed by CORS (empty disables the layer).
    pub cors_origin: Option<String>,

    /// Optional bound on each backend dial.
    pub connect_timeout: Option<Duration>,

    /// Relay timing.
    pub relay: RelaySettings,

    /// Retries after the first failed start.
    pub max_retries: u32,

    /// Backoff jitter factor (0.0 to 1.0).
    pub retry_jitter: f64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = lookup("BRIDGE_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:5000".to_string())
            .parse()
            .context("BRIDGE_LISTEN_ADDR must be a socket address (host:port).")?;

        let backend_addr = lookup("BRIDGE_BACKEND_ADDR")
            .map(|v| v.parse())
            .transpose()
            .context("BRIDGE_BACKEND_ADDR must be a socket address (host:port).")?
            .unwrap_or(DEFAULT_BACKEND_ADDR);

        let cors_origin = match lookup("BRIDGE_CORS_ORIGIN") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => Some("http://localhost:4200".to_string()),
        };

        let millis = |key: &str| -> Result<Option<Duration>> {
            lookup(key)
                .map(|v| v.parse::<u64>())
                .transpose()
                .with_context(|| format!("{key} must be an integer (milliseconds)."))
                .map(|v| v.map(Duration::from_millis))
        };

        let defaults = RelaySettings::default();
        let relay = RelaySettings {
            chunk_size: defaults.chunk_size,
            receive_timeout: millis("BRIDGE_RECEIVE_TIMEOUT_MS")?.unwrap_or(defaults.receive_timeout),
            keepalive_interval: millis("BRIDGE_KEEPALIVE_INTERVAL_MS")?
                .unwrap_or(defaults.keepalive_interval),
            shutdown_grace: millis("BRIDGE_SHUTDOWN_GRACE_MS")?.unwrap_or(defaults.shutdown_grace),
        };

        let connect_timeout = millis("BRIDGE_CONNECT_TIMEOUT_MS")?;

        let max_retries: u32 = lookup("BRIDGE_RETRY_MAX")
            .map(|v| v.parse())
            .transpose()
            .context("BRIDGE_RETRY_MAX must be an integer.")?
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let retry_jitter: f64 = lookup("BRIDGE_RETRY_JITTER")
            .map(|v| v.parse())
            .transpose()
            .context("BRIDGE_RETRY_JITTER must be a number between 0 and 1.")?
            .unwrap_or(0.0);
        anyhow::ensure!(
            (0.0..=1.0).contains(&retry_jitter),
            "BRIDGE_RETRY_JITTER must be a number between 0 and 1."
        );

        let log_level = lookup("BRIDGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            listen_addr,
            backend_addr,
            cors_origin,
            connect_timeout,
            relay,
            max_retries,
            retry_jitter,
            log_level,
        })
    }

    /// Retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: BackoffPolicy {
                jitter: self.retry_jitter,
                ..defaults.backoff
            },
            ..defaults
        }
    }
}
