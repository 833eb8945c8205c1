use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::tcp::OwnedWriteHalf,
    sync::{Mutex, oneshot},
};
use tracing::{debug, warn};

use crate::protocol::write_message;

/// Maximum number of simultaneously registered clients.
pub const DEFAULT_CAPACITY: usize = 10;

pub type ClientId = u64;

/// Resolves once the registry has dropped the matching [`ClientHandle`]
/// without the session asking for it, i.e. during shutdown.
pub type Eviction = oneshot::Receiver<()>;

/// The registry's view of one connection: its identity plus the write side
/// used for fan-out. The session keeps the read side.
#[derive(Debug)]
pub struct ClientHandle<W = OwnedWriteHalf> {
    id: ClientId,
    peer: Option<SocketAddr>,
    writer: W,
    _eviction: oneshot::Sender<()>,
}

impl<W> ClientHandle<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(id: ClientId, peer: Option<SocketAddr>, writer: W) -> (Self, Eviction) {
        let (eviction_tx, eviction_rx) = oneshot::channel();
        let handle = Self {
            id,
            peer,
            writer,
            _eviction: eviction_tx,
        };
        (handle, eviction_rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Shuts down the write side and releases the handle. Failures are
    /// ignored: the peer may already be gone.
    pub async fn close(mut self) {
        if let Err(error) = self.writer.shutdown().await {
            debug!(client = self.id, ?error, "failed to shut down client writer");
        }
    }
}

#[derive(Debug)]
pub enum RegisterError<W = OwnedWriteHalf> {
    /// The registry is full. The rejected handle is handed back so the caller
    /// can close it.
    CapacityReached(ClientHandle<W>),
    /// [`Registry::close_all`] has run; no client may join any more.
    Closed(ClientHandle<W>),
}

/// Shared set of connected clients.
///
/// A single lock covers registration, removal and broadcast, so a broadcast
/// always sees a consistent snapshot and never writes to a removed client.
pub struct Registry<W = OwnedWriteHalf> {
    clients: Mutex<Vec<ClientHandle<W>>>,
    capacity: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<W> Default for Registry<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Registry<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn register(&self, handle: ClientHandle<W>) -> Result<(), RegisterError<W>> {
        let mut clients = self.clients.lock().await;
        // Checked under the lock: a handle pushed before `close_all` sets the
        // flag is still drained by it.
        if self.closed.load(Ordering::SeqCst) {
            return Err(RegisterError::Closed(handle));
        }
        if clients.len() >= self.capacity {
            return Err(RegisterError::CapacityReached(handle));
        }
        clients.push(handle);
        Ok(())
    }

    /// Removes the client if it is still registered. Calling this twice, or
    /// after [`Registry::close_all`], is a no-op.
    pub async fn deregister(&self, id: ClientId) -> Option<ClientHandle<W>> {
        let mut clients = self.clients.lock().await;
        let position = clients.iter().position(|client| client.id == id)?;
        Some(clients.remove(position))
    }

    /// Sends `message` to every registered client except `sender` and returns
    /// how many writes succeeded. A failed write is logged and skipped; the
    /// recipient's own session notices the broken connection.
    pub async fn broadcast(&self, sender: ClientId, message: &[u8]) -> usize {
        let mut clients = self.clients.lock().await;
        let mut delivered = 0;

        for client in clients.iter_mut().filter(|client| client.id != sender) {
            match write_message(&mut client.writer, message).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(client = client.id, peer = ?client.peer, ?error, "failed to deliver message");
                }
            }
        }

        delivered
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Empties the registry for good and closes every handle it held.
    /// Sessions blocked on a read observe the eviction and wind down on their
    /// own; later registrations fail with [`RegisterError::Closed`].
    pub async fn close_all(&self) -> usize {
        // Set before waiting on the lock so nothing can slip in while an
        // in-flight broadcast holds it.
        self.closed.store(true, Ordering::SeqCst);
        let snapshot: Vec<_> = self.clients.lock().await.drain(..).collect();
        let closed = snapshot.len();
        for client in snapshot {
            client.close().await;
        }
        closed
    }
}
