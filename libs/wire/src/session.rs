//! A single live TCP connection to or from the backend.
//!
//! The stream is split into read and write halves, each behind its own async
//! mutex: at most one receive and one send are outstanding at any time, and a
//! receive never blocks a send.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::codec;
use crate::error::WireError;

/// Owns one TCP connection, speaking the single-byte text encoding.
pub struct SocketSession {
    peer_addr: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    released: AtomicBool,
}

impl SocketSession {
    /// Wrap a connected stream.
    pub fn new(stream: TcpStream) -> Result<Self, WireError> {
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            peer_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            released: AtomicBool::new(false),
        })
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Wait for the next chunk of at most `max` bytes.
    ///
    /// Returns `Ok(None)` when the remote end closed the connection in an
    /// orderly way (zero-length read).
    pub async fn receive(&self, max: usize) -> Result<Option<String>, WireError> {
        if self.is_released() {
            return Err(WireError::Closed);
        }

        let mut buf = vec![0u8; max];
        let mut reader = self.reader.lock().await;
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            debug!(peer_addr = %self.peer_addr, "Remote closed connection");
            return Ok(None);
        }

        trace!(peer_addr = %self.peer_addr, bytes = n, "Received chunk");
        Ok(Some(codec::decode(&buf[..n])))
    }

    /// Like [`receive`](Self::receive), failing with [`WireError::Timeout`] if
    /// nothing arrives within `deadline`.
    pub async fn receive_timeout(
        &self,
        max: usize,
        deadline: Duration,
    ) -> Result<Option<String>, WireError> {
        match tokio::time::timeout(deadline, self.receive(max)).await {
            Ok(result) => result,
            Err(_) => Err(WireError::Timeout(deadline)),
        }
    }

    /// Encode and write a whole message.
    pub async fn send(&self, message: &str) -> Result<(), WireError> {
        if self.is_released() {
            return Err(WireError::Closed);
        }

        let bytes = codec::encode(message);
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        trace!(peer_addr = %self.peer_addr, bytes = bytes.len(), "Sent message");
        Ok(())
    }

    /// Shut the connection down. Only the first call has any effect.
    ///
    /// Shutdown failures are swallowed; the descriptor itself closes when the
    /// session is dropped.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(peer_addr = %self.peer_addr, error = %e, "Socket shutdown failed");
        }
        debug!(peer_addr = %self.peer_addr, "Socket session released");
    }
}

impl std::fmt::Debug for SocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSession")
            .field("peer_addr", &self.peer_addr)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (SocketSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let session = SocketSession::new(client.unwrap()).unwrap();
        (session, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_receive_decodes_latin1() {
        let (session, mut remote) = pair().await;
        remote.write_all(&[b'o', b'l', 0xe1]).await.unwrap();

        let chunk = session.receive(512).await.unwrap();
        assert_eq!(chunk.as_deref(), Some("ol\u{e1}"));
    }

    #[tokio::test]
    async fn test_receive_respects_max() {
        let (session, mut remote) = pair().await;
        remote.write_all(&[b'x'; 20]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = session.receive(8).await.unwrap().unwrap();
        assert_eq!(first.len(), 8);
    }

    #[tokio::test]
    async fn test_orderly_close_is_none() {
        let (session, remote) = pair().await;
        drop(remote);

        assert!(session.receive(512).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let (session, _remote) = pair().await;

        let err = session
            .receive_timeout(512, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_send_encodes_latin1() {
        let (session, mut remote) = pair().await;
        session.send("caf\u{e9}").await.unwrap();

        let mut buf = [0u8; 8];
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[b'c', b'a', b'f', 0xe9]);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (session, mut remote) = pair().await;

        session.release().await;
        session.release().await;
        assert!(session.is_released());

        // Remote observes end of stream
        let mut buf = [0u8; 8];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);

        assert!(matches!(session.send("x").await, Err(WireError::Closed)));
        assert!(matches!(session.receive(8).await, Err(WireError::Closed)));
    }
}
