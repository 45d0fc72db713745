//! tcpbridge backend
//!
//! Legacy-style socket server the gateway relays from. Accepts raw TCP
//! connections, prints what each one sends, and lets an operator reply to a
//! specific connection from the console.

use std::sync::Arc;

use anyhow::{Context, Result};
use tcpbridge_backend::{config, console, BackendServer, ConnectionRegistry, Console};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Logs go to stderr so they do not interleave with the console menu.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("Starting tcpbridge backend");

    let registry = Arc::new(ConnectionRegistry::new());
    let (messages_tx, mut messages_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = Arc::new(
        BackendServer::bind(config.listener(), Arc::clone(&registry), messages_tx)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?,
    );

    let server_task = tokio::spawn(Arc::clone(&server).run(shutdown_rx));

    tokio::spawn(async move {
        while let Some(message) = messages_rx.recv().await {
            println!("Received from {}: {}", message.connection_id, message.text);
        }
    });

    let ctrl_c_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            ctrl_c_shutdown.send_replace(true);
        }
    });

    let console_input =
        console::spawn_stdin_reader().context("Failed to start console input reader")?;
    let console_shutdown = shutdown_tx.clone();
    let console_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        let mut console = Console::new(
            console_registry,
            console_input,
            tokio::io::stdout(),
            console_shutdown,
        );
        if let Err(e) = console.run().await {
            error!(error = %e, "Console failed");
        }
    });

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Backend server failed"),
        Err(e) => error!(error = %e, "Backend server task panicked"),
    }

    info!("Backend stopped");
    Ok(())
}
