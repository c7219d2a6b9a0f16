//! Echo Service
//!
//! Reads each accepted connection to the peer's FIN, writes the bytes back,
//! half-closes and closes. Every accepted handle is closed when its task
//! ends, whether the exchange succeeded or not.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::ConnectionManager;
use crate::error::TcpError;
use crate::handle::ConnectionHandle;

/// Accept connections on `listener` until `shutdown` resolves, then close
/// whatever is still attached.
pub async fn serve<F>(manager: Arc<ConnectionManager>, listener: TcpListener, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()>,
{
    info!("Echo server listening on {}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let handle = match manager.attach(stream).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!("Rejected connection from {}: {}", peer, e);
                        continue;
                    }
                };
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(&manager, handle).await {
                        warn!(%handle, "Echo to {} failed: {}", peer, e);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Echo server shutting down");
                break;
            }
        }
    }

    for handle in manager.active_handles().await {
        if let Err(e) = manager.close(handle, manager.close_deadline()).await {
            warn!(%handle, "Close during shutdown failed: {}", e);
        }
    }
    info!("Echo server stopped");
    Ok(())
}

/// Run one echo exchange on `handle` and close it. The exchange error, if
/// any, takes precedence over the close error.
pub async fn handle_connection(manager: &ConnectionManager, handle: ConnectionHandle) -> Result<(), TcpError> {
    let exchange = echo_back(manager, handle).await;
    let closed = manager.close(handle, manager.close_deadline()).await;
    exchange.and(closed)
}

async fn echo_back(manager: &ConnectionManager, handle: ConnectionHandle) -> Result<(), TcpError> {
    let received = manager.read_to_fin(handle, manager.default_deadline()).await?;
    manager.send(handle, &received, manager.default_deadline()).await?;
    manager.done(handle, manager.default_deadline()).await
}
