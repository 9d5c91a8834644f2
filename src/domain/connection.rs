//! Closable byte-stream connection returned by a dial.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;

use super::resource_stack::Closer;
use crate::error::Result;
use crate::ports::BoxedStream;

#[derive(Default)]
struct Slot {
    stream: Option<BoxedStream>,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

struct Shared {
    peer: String,
    closed: AtomicBool,
    slot: Mutex<Slot>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An open connection to a host, directly or through a tunnel.
///
/// The stream is shared with a [`ConnectionHandle`] registered on the dial's
/// [`ResourceStack`](super::ResourceStack); closing through the handle makes
/// pending and future reads return EOF and writes fail with `NotConnected`.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    #[must_use]
    pub fn new(stream: BoxedStream, peer: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                peer: peer.into(),
                closed: AtomicBool::new(false),
                slot: Mutex::new(Slot {
                    stream: Some(stream),
                    ..Slot::default()
                }),
            }),
        }
    }

    /// The `host:port` this connection was dialed to
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// A handle that can close this connection from elsewhere.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.shared.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut slot = self.shared.slot();
        let Some(stream) = slot.stream.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let poll = stream.as_mut().poll_read(cx, buf);
        if poll.is_pending() {
            slot.read_waker = Some(cx.waker().clone());
        }
        poll
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut slot = self.shared.slot();
        let Some(stream) = slot.stream.as_mut() else {
            return Poll::Ready(Err(io::ErrorKind::NotConnected.into()));
        };
        let poll = stream.as_mut().poll_write(cx, buf);
        if poll.is_pending() {
            slot.write_waker = Some(cx.waker().clone());
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut slot = self.shared.slot();
        let Some(stream) = slot.stream.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let poll = stream.as_mut().poll_flush(cx);
        if poll.is_pending() {
            slot.write_waker = Some(cx.waker().clone());
        }
        poll
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut slot = self.shared.slot();
        let Some(stream) = slot.stream.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        stream.as_mut().poll_shutdown(cx)
    }
}

/// Closes the [`Connection`] it was taken from. Idempotent.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Closer for ConnectionHandle {
    async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (stream, wakers) = {
            let mut slot = self.shared.slot();
            let wakers = [slot.read_waker.take(), slot.write_waker.take()];
            (slot.stream.take(), wakers)
        };
        for waker in wakers.into_iter().flatten() {
            waker.wake();
        }

        let Some(mut stream) = stream else {
            return Ok(());
        };
        debug!(peer = %self.shared.peer, "Closing connection");
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    fn pair() -> (Connection, tokio::io::DuplexStream) {
        let (ours, theirs) = duplex(64);
        (Connection::new(Box::pin(ours), "db.internal:22"), theirs)
    }

    #[tokio::test]
    async fn test_connection_passes_bytes_through() {
        let (mut conn, mut peer) = pair();
        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").await.unwrap();
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_close_through_handle() {
        let (mut conn, mut peer) = pair();
        let handle = conn.handle();
        handle.close().await.unwrap();

        assert!(conn.is_closed());
        assert!(handle.is_closed());

        let mut buf = Vec::new();
        assert_eq!(conn.read_to_end(&mut buf).await.unwrap(), 0);
        let err = conn.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        // Peer sees EOF once our end is dropped
        assert_eq!(peer.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _peer) = pair();
        let handle = conn.handle();
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_reader() {
        let (mut conn, _peer) = pair();
        let handle = conn.handle();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            conn.read(&mut buf).await
        });
        tokio::task::yield_now().await;
        handle.close().await.unwrap();

        let n = reader.await.unwrap().unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_connection_debug_shows_peer() {
        let (conn, _peer) = pair();
        let debug = format!("{conn:?}");
        assert!(debug.contains("db.internal:22"));
    }
}
