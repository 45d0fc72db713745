//! tcpbridge gateway
//!
//! Accepts browser WebSocket connections and relays data from the backend
//! socket server to each of them.
//!
//! For every inbound connection this service:
//! - Opens a TCP session to the backend (retried with backoff)
//! - Forwards backend chunks to the browser as `Update` events
//! - Pings the backend periodically to keep the session alive
//! - Tears the backend session down when the browser disconnects

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tcpbridge_gateway::{config, create_router, GatewayState, RelayFactory, SessionRegistry};
use tcpbridge_wire::{Connector, TcpConnector};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to BRIDGE_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tcpbridge gateway");
    info!(
        listen_addr = %config.listen_addr,
        backend_addr = %config.backend_addr,
        max_retries = config.max_retries,
        retry_jitter = config.retry_jitter,
        "Configuration loaded"
    );

    let connector: Arc<dyn Connector> = match config.connect_timeout {
        Some(timeout) => Arc::new(TcpConnector::with_timeout(config.backend_addr, timeout)),
        None => Arc::new(TcpConnector::new(config.backend_addr)),
    };

    let registry = Arc::new(SessionRegistry::new());
    let factory = Arc::new(RelayFactory::new(
        connector,
        config.relay.clone(),
        config.retry_policy(),
    ));

    let cors_origin = config
        .cors_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("BRIDGE_CORS_ORIGIN is not a valid header value.")?;

    let app = create_router(
        GatewayState::new(Arc::clone(&registry), factory),
        cors_origin,
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    registry.stop_all().await;
    info!("Gateway stopped");

    Ok(())
}
