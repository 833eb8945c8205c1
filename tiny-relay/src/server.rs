use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, warn};

use crate::{
    registry::Registry,
    session::serve_connection,
    shutdown::{coordinate, interrupt},
};

/// Accepts connections and hands each one to its own session task.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    /// Binds every IPv4 interface on `port`. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .with_context(|| format!("failed to bind port {port}"))?;
        Ok(Self::new(listener))
    }

    pub fn new(listener: TcpListener) -> Self {
        Self::with_registry(listener, Arc::new(Registry::new()))
    }

    pub fn with_registry(listener: TcpListener, registry: Arc<Registry>) -> Self {
        Self { listener, registry }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Serves clients until `shutdown` completes, then closes the listener and
    /// every registered connection. Sessions still on their way to registering
    /// find the registry closed and drop their connection.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry);
                }
            }
        }

        coordinate(listener, &registry).await;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(interrupt()).await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, registry),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>) {
    debug!(%peer, "accepted connection");
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let end = serve_connection(stream, peer, registry).await;
        debug!(%peer, ?end, "session finished");
    });
}
