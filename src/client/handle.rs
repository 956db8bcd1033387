//! Module `handle`
//!
//! A [`ClientHandle`] is the registry's key and the broadcaster's way of
//! reaching one connection. The owning handler keeps the read side; the
//! handle wraps the write side so it can be shared.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

type Outbound = Box<dyn AsyncWrite + Send + Unpin>;

/// Opaque identifier of one accepted connection.
///
/// Ids are handed out in accept order, so ordering by id is join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cloneable reference to one connection's outbound side.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    writer: Arc<Mutex<Outbound>>,
}

impl ClientHandle {
    pub fn new<W>(id: ClientId, peer: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer,
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes the whole payload and flushes it.
    ///
    /// Concurrent senders are serialized per connection, so payloads never
    /// interleave on the wire.
    pub async fn send(&self, payload: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(payload).await?;
        writer.flush().await
    }

    /// [`ClientHandle::send`] bounded by `limit`; running out of time is
    /// reported as `TimedOut`.
    pub async fn send_timeout(&self, payload: &[u8], limit: Duration) -> io::Result<()> {
        match timeout(limit, self.send(payload)).await {
            Ok(sent) => sent,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out after {:?}", limit),
            )),
        }
    }

    /// Shuts down the write side; the peer sees end of stream.
    pub async fn close(&self) -> io::Result<()> {
        self.writer.lock().await.shutdown().await
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
