//! TCP Transport Implementation

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::Transport;
use crate::handle::ConnectionHandle;

/// One attached stream. Read and write halves are locked separately so a
/// pending read never holds up a write or a FIN.
#[derive(Debug)]
struct StreamSlot {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    peer_addr: Option<SocketAddr>,
    peer_fin: AtomicBool,
}

/// Transport over tokio TCP streams keyed by connection handle
#[derive(Debug, Default)]
pub struct TcpTransport {
    streams: RwLock<HashMap<ConnectionHandle, Arc<StreamSlot>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `stream` under `handle`.
    pub fn attach(&self, handle: ConnectionHandle, stream: TcpStream, nodelay: bool) -> io::Result<()> {
        stream.set_nodelay(nodelay)?;
        let peer_addr = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        if streams.contains_key(&handle) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("handle {} already has a stream", handle),
            ));
        }
        streams.insert(
            handle,
            Arc::new(StreamSlot {
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                peer_addr,
                peer_fin: AtomicBool::new(false),
            }),
        );
        debug!(%handle, peer = ?peer_addr, nodelay, "Attached TCP stream");
        Ok(())
    }

    /// Hand the stream for `handle` back to the caller.
    ///
    /// Fails with `WouldBlock` while another operation is still using the
    /// stream; the stream then stays attached.
    pub fn detach(&self, handle: ConnectionHandle) -> io::Result<TcpStream> {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        let slot = streams.remove(&handle).ok_or_else(|| not_attached(handle))?;

        match Arc::try_unwrap(slot) {
            Ok(slot) => {
                let reader = slot.reader.into_inner();
                let writer = slot.writer.into_inner();
                let stream = reader
                    .reunite(writer)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                debug!(%handle, "Detached TCP stream");
                Ok(stream)
            }
            Err(slot) => {
                streams.insert(handle, slot);
                Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("stream for handle {} is busy", handle),
                ))
            }
        }
    }

    /// Drop the stream for `handle`, if any.
    pub fn release(&self, handle: ConnectionHandle) -> bool {
        let removed = self
            .streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
            .is_some();
        if removed {
            debug!(%handle, "Released TCP stream");
        }
        removed
    }

    /// Write all of `data` to the stream.
    pub async fn send(&self, handle: ConnectionHandle, data: &[u8]) -> io::Result<()> {
        let slot = self.slot(handle)?;
        let mut writer = slot.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        trace!(%handle, bytes = data.len(), "Sent data");
        Ok(())
    }

    /// Read into `buf`. A zero-length read into a non-empty buffer records
    /// the peer's FIN.
    pub async fn recv(&self, handle: ConnectionHandle, buf: &mut [u8]) -> io::Result<usize> {
        let slot = self.slot(handle)?;
        let mut reader = slot.reader.lock().await;
        let n = reader.read(buf).await?;
        if n == 0 && !buf.is_empty() {
            slot.peer_fin.store(true, Ordering::Release);
            debug!(%handle, peer = ?slot.peer_addr, "Peer sent FIN");
        } else {
            trace!(%handle, bytes = n, "Received data");
        }
        Ok(n)
    }

    pub fn peer_addr(&self, handle: ConnectionHandle) -> Option<SocketAddr> {
        self.slot(handle).ok().and_then(|slot| slot.peer_addr)
    }

    fn slot(&self, handle: ConnectionHandle) -> io::Result<Arc<StreamSlot>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or_else(|| not_attached(handle))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_fin(&self, handle: ConnectionHandle) -> io::Result<()> {
        let slot = self.slot(handle)?;
        let mut writer = slot.writer.lock().await;
        writer.shutdown().await?;
        debug!(%handle, peer = ?slot.peer_addr, "Sent FIN");
        Ok(())
    }

    fn peer_fin_received(&self, handle: ConnectionHandle) -> bool {
        self.slot(handle)
            .map(|slot| slot.peer_fin.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

fn not_attached(handle: ConnectionHandle) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no stream attached to handle {}", handle),
    )
}
