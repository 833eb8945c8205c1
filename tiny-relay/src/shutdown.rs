use std::time::Duration;

use tokio::{io::AsyncWrite, net::TcpListener, time::timeout};
use tracing::{info, warn};

use crate::registry::Registry;

/// Upper bound on waiting for an in-flight broadcast to release the registry
/// before giving up on closing clients one by one.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Completes on the first Ctrl-C (SIGINT).
///
/// If the handler cannot be installed the future never completes, so the
/// server keeps running rather than shutting down straight away.
pub async fn interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received"),
        Err(error) => {
            warn!(?error, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Stops accepting connections and closes every registered client.
///
/// Runs once per server: the accept loop calls it and then returns, so a
/// repeated interrupt has nothing left to act on. Per-client close failures
/// are not reported. Returns how many clients were closed, or `None` when the
/// registry stayed busy past [`CLOSE_GRACE`].
pub async fn coordinate<W>(listener: TcpListener, registry: &Registry<W>) -> Option<usize>
where
    W: AsyncWrite + Unpin + Send,
{
    info!("server shutting down");
    drop(listener);

    // `close_all` needs the registry lock, which a broadcast stuck on a slow
    // peer may hold. The registry refuses new clients from the moment
    // `close_all` starts; whatever is still open after the grace period is
    // left for process exit.
    match timeout(CLOSE_GRACE, registry.close_all()).await {
        Ok(closed) => {
            info!(closed, "closed client connections");
            Some(closed)
        }
        Err(_) => {
            warn!(
                grace = ?CLOSE_GRACE,
                "registry still busy, leaving remaining connections to process exit"
            );
            None
        }
    }
}
