//! Operator console.
//!
//! A line-oriented menu driving the connection registry:
//! - `1`: send `pong - client: <id>` to a connection
//! - `2`: list connected ids
//! - `0`: exit
//!
//! Input that is not a number also stops the server. The console gives up
//! waiting for input as soon as shutdown is signalled from elsewhere.

use std::io::{self, BufRead};
use std::sync::Arc;

use tcpbridge_wire::ConnectionId;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::registry::{ConnectionRegistry, Delivery};

const MENU: &str = "*** CHOOSE AN OPTION ***\n\
- Send message pong to specific client (1)\n\
- List connected clients (2)\n\
- Exit (0)\n";

/// One parsed menu selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    SendPong,
    List,
    Exit,
    /// A number with no menu entry; ignored.
    Unknown,
    /// Not a number; stops the server.
    Invalid,
}

impl ConsoleInput {
    pub fn parse(line: &str) -> Self {
        match line.trim().parse::<i64>() {
            Ok(1) => Self::SendPong,
            Ok(2) => Self::List,
            Ok(0) => Self::Exit,
            Ok(_) => Self::Unknown,
            Err(_) => Self::Invalid,
        }
    }
}

/// Message sent to a connection by the `1` command.
pub fn pong_message(connection_id: &ConnectionId) -> String {
    format!("pong - client: {connection_id}")
}

/// Lines buffered between the stdin reader thread and the console.
const INPUT_BUFFER: usize = 16;

/// Read stdin lines on a dedicated OS thread.
///
/// The read blocks and cannot be cancelled, so the thread is detached and the
/// process may exit while it waits.
pub fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            debug!("Console input closed");
        })?;
    Ok(rx)
}

/// Interactive console over a stream of input lines and a text output.
pub struct Console<W> {
    registry: Arc<ConnectionRegistry>,
    input: mpsc::Receiver<String>,
    output: W,
    shutdown: watch::Sender<bool>,
}

impl<W> Console<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        input: mpsc::Receiver<String>,
        output: W,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            registry,
            input,
            output,
            shutdown,
        }
    }

    /// Run the menu until exit, invalid input, end of input, or an external
    /// shutdown. Always signals shutdown on return.
    pub async fn run(&mut self) -> io::Result<()> {
        let result = self.menu_loop().await;
        self.shutdown.send_replace(true);
        result
    }

    async fn menu_loop(&mut self) -> io::Result<()> {
        loop {
            self.write(MENU).await?;

            let Some(line) = self.read_line().await else {
                return Ok(());
            };

            match ConsoleInput::parse(&line) {
                ConsoleInput::SendPong => self.send_pong().await?,
                ConsoleInput::List => self.list().await?,
                ConsoleInput::Exit => return Ok(()),
                ConsoleInput::Unknown => {}
                ConsoleInput::Invalid => {
                    warn!(input = %line.trim(), "Invalid console input, shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn send_pong(&mut self) -> io::Result<()> {
        self.write("Would you like send a message for what client? ")
            .await?;
        let Some(line) = self.read_line().await else {
            return Ok(());
        };

        let Ok(connection_id) = line.parse::<ConnectionId>() else {
            return self.write("Unknown client.\n").await;
        };

        match self
            .registry
            .send_to(&connection_id, &pong_message(&connection_id))
            .await
        {
            Ok(Delivery::Sent) => {
                info!(connection_id = %connection_id, "Pong sent");
                self.write("Message sent.\n").await
            }
            Ok(Delivery::UnknownConnection) => self.write("Unknown client.\n").await,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Failed to send pong");
                self.write(&format!("Send failed: {e}\n")).await
            }
        }
    }

    async fn list(&mut self) -> io::Result<()> {
        let mut listing = String::from("Clients connected\n");
        for connection_id in self.registry.connection_ids().await {
            listing.push_str(&format!("Client: {connection_id}\n"));
        }
        self.write(&listing).await
    }

    /// Next input line, or `None` on end of input or shutdown.
    async fn read_line(&mut self) -> Option<String> {
        let shutdown = self.shutdown.subscribe();
        tokio::select! {
            line = self.input.recv() => line,
            _ = shutdown_requested(shutdown) => None,
        }
    }

    async fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }
}

async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
