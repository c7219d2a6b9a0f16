//! Transport Module
//!
//! The boundary between handle bookkeeping and the bytes on the wire.

pub mod tcp;

pub use tcp::TcpTransport;

use async_trait::async_trait;
use std::io;

use crate::handle::ConnectionHandle;

/// Wire-level operations needed to half-close a connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Emit a FIN for `handle`, closing its outbound direction.
    async fn send_fin(&self, handle: ConnectionHandle) -> io::Result<()>;

    /// Whether the peer's FIN has already been observed on `handle`.
    fn peer_fin_received(&self, handle: ConnectionHandle) -> bool;
}
