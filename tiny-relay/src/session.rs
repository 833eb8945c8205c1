//! Per-connection session handling.
//!
//! A session moves through `ACCEPTED -> ACTIVE -> CLOSING -> CLOSED`. It only
//! becomes active once the registry accepts it; every path out of the read
//! loop ends with the client deregistered and its connection closed.

use std::{io, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    select,
};
use tracing::{debug, info, warn};

use crate::{
    protocol::{MAX_MESSAGE_SIZE, is_terminal_token, read_message},
    registry::{ClientHandle, ClientId, Eviction, RegisterError, Registry},
};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The registry was full; the connection was closed before any read.
    Rejected,
    /// The peer closed its side of the connection.
    PeerClosed,
    /// The peer sent one of the terminal tokens.
    TerminalToken,
    /// The registry closed the connection during shutdown, or had already
    /// shut down when the connection arrived.
    Evicted,
    /// Reading from the peer failed.
    ReadFailed,
}

/// Serves one accepted TCP connection until it ends.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
) -> SessionEnd {
    let (reader, writer) = stream.into_split();
    let (handle, eviction) = ClientHandle::new(registry.next_id(), Some(peer), writer);
    run_session(&registry, reader, handle, eviction).await
}

/// Registers `handle`, relays everything read from `reader` to the other
/// clients, then deregisters and closes the connection.
pub async fn run_session<R, W>(
    registry: &Registry<W>,
    mut reader: R,
    handle: ClientHandle<W>,
    mut eviction: Eviction,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let id = handle.id();
    let peer = handle.peer();

    match registry.register(handle).await {
        Ok(()) => {}
        Err(RegisterError::CapacityReached(rejected)) => {
            info!(
                client = id,
                ?peer,
                capacity = registry.capacity(),
                "max clients reached, closing new connection"
            );
            rejected.close().await;
            return SessionEnd::Rejected;
        }
        Err(RegisterError::Closed(rejected)) => {
            debug!(client = id, ?peer, "server shutting down, closing new connection");
            rejected.close().await;
            return SessionEnd::Evicted;
        }
    }
    info!(client = id, ?peer, "client connected");

    let end = match relay_messages(registry, id, &mut reader, &mut eviction).await {
        Ok(end) => end,
        Err(error) => {
            warn!(client = id, ?peer, ?error, "failed to read from client");
            SessionEnd::ReadFailed
        }
    };

    if let Some(handle) = registry.deregister(id).await {
        handle.close().await;
    }
    info!(client = id, ?peer, reason = ?end, "client disconnected");

    end
}

async fn relay_messages<R, W>(
    registry: &Registry<W>,
    id: ClientId,
    reader: &mut R,
    eviction: &mut Eviction,
) -> io::Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = [0u8; MAX_MESSAGE_SIZE];

    loop {
        let message = select! {
            message = read_message(reader, &mut buf) => message?,
            _ = &mut *eviction => return Ok(SessionEnd::Evicted),
        };

        let Some(message) = message else {
            return Ok(SessionEnd::PeerClosed);
        };

        if is_terminal_token(message) {
            return Ok(SessionEnd::TerminalToken);
        }

        debug!(client = id, message = %String::from_utf8_lossy(message), "received message");
        registry.broadcast(id, message).await;
    }
}
