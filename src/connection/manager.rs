//! Connection Manager Implementation

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

use super::{Deadline, HalfCloseOperation};
use crate::config::Config;
use crate::error::TcpError;
use crate::handle::table::transition;
use crate::handle::{ConnectionHandle, ConnectionState, HandleTable};
use crate::metrics::Metrics;
use crate::transport::{TcpTransport, Transport};

/// Owns every attached TCP connection and exposes handle-based operations
/// on them: send, receive, half-close, close and detach.
pub struct ConnectionManager {
    config: Arc<Config>,
    table: Arc<HandleTable>,
    transport: Arc<TcpTransport>,
    half_close: HalfCloseOperation<TcpTransport>,
    metrics: Arc<Metrics>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(config: Arc<Config>) -> prometheus::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self::with_metrics(config, metrics))
    }

    /// Create a ConnectionManager that reports into existing metrics
    pub fn with_metrics(config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        let table = Arc::new(HandleTable::new());
        let transport = Arc::new(TcpTransport::new());
        let half_close = HalfCloseOperation::new(Arc::clone(&table), Arc::clone(&transport))
            .with_metrics(Arc::clone(&metrics));

        Self {
            config,
            table,
            transport,
            half_close,
            metrics,
        }
    }

    /// Register an established stream and issue a handle for it.
    pub async fn attach(&self, stream: TcpStream) -> Result<ConnectionHandle, TcpError> {
        let max_handles = self.config.connection.max_handles;
        let handle = match self
            .table
            .insert_bounded(ConnectionState::Open, max_handles)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                warn!(max_handles, "Handle limit reached, rejecting connection");
                self.metrics.record_failure(&err);
                return Err(err);
            }
        };

        if let Err(e) = self
            .transport
            .attach(handle, stream, self.config.connection.nodelay)
        {
            if let Err(remove_err) = self.table.remove(handle).await {
                warn!(%handle, error = %remove_err, "Failed to roll back handle after attach error");
            }
            let err = TcpError::from_io(handle, e);
            self.metrics.record_failure(&err);
            return Err(err);
        }

        self.metrics.handle_attached();
        info!(%handle, peer = ?self.transport.peer_addr(handle), "Connection attached");
        Ok(handle)
    }

    /// Write all of `data` on `handle`.
    #[instrument(skip_all, fields(handle = %handle, bytes = data.len()))]
    pub async fn send(
        &self,
        handle: ConnectionHandle,
        data: &[u8],
        deadline: Deadline,
    ) -> Result<(), TcpError> {
        let result = self.send_inner(handle, data, deadline).await;
        match &result {
            Ok(()) => self.metrics.bytes_sent(data.len()),
            Err(e) => self.metrics.record_failure(e),
        }
        result
    }

    async fn send_inner(
        &self,
        handle: ConnectionHandle,
        data: &[u8],
        deadline: Deadline,
    ) -> Result<(), TcpError> {
        let state = self.table.lookup(handle).await?;
        if !state.can_send() {
            return Err(TcpError::BrokenPipe(handle));
        }

        deadline
            .run(self.transport.send(handle, data))
            .await
            .map_err(|_| TcpError::Timeout(handle))?
            .map_err(|e| TcpError::from_io(handle, e))
    }

    /// Read into `buf`. `Ok(0)` means the peer has sent FIN; reading again
    /// after that fails with `BrokenPipe`.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn recv(
        &self,
        handle: ConnectionHandle,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, TcpError> {
        let result = self.recv_inner(handle, buf, deadline).await;
        match &result {
            Ok(n) => self.metrics.bytes_received(*n),
            Err(e) => self.metrics.record_failure(e),
        }
        result
    }

    async fn recv_inner(
        &self,
        handle: ConnectionHandle,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, TcpError> {
        let entry = self.table.entry(handle).await?;
        if !entry.lock().await.can_recv() {
            return Err(TcpError::BrokenPipe(handle));
        }

        let is_empty = buf.is_empty();
        let n = deadline
            .run(self.transport.recv(handle, buf))
            .await
            .map_err(|_| TcpError::Timeout(handle))?
            .map_err(|e| TcpError::from_io(handle, e))?;

        if n == 0 && !is_empty {
            let mut state = entry.lock().await;
            let next = state.after_remote_fin();
            transition(handle, &mut state, next)?;
            debug!(state = %next, "Peer finished sending");
        }
        Ok(n)
    }

    /// Read everything the peer sends until its FIN, using reads of the
    /// configured buffer size. The whole read is bounded by `deadline`.
    pub async fn read_to_fin(
        &self,
        handle: ConnectionHandle,
        deadline: Deadline,
    ) -> Result<Vec<u8>, TcpError> {
        let mut received = Vec::new();
        let mut buf = vec![0u8; self.config.connection.recv_buffer_size];
        loop {
            match self.recv(handle, &mut buf, deadline).await? {
                0 => return Ok(received),
                n => received.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// Half-close `handle` (send FIN).
    pub async fn done(&self, handle: ConnectionHandle, deadline: Deadline) -> Result<(), TcpError> {
        self.half_close.execute(handle, deadline).await
    }

    /// Close `handle` completely.
    ///
    /// Sends FIN unless already sent, then discards inbound data until the
    /// peer's FIN arrives. The handle is released whatever the outcome;
    /// `Timeout` means the peer did not finish before the deadline.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn close(&self, handle: ConnectionHandle, deadline: Deadline) -> Result<(), TcpError> {
        let result = self.close_inner(handle, deadline).await;
        if self.table.remove(handle).await.is_ok() {
            self.transport.release(handle);
            self.metrics.handle_released();
            info!(%handle, "Connection closed");
        }
        if let Err(e) = &result {
            warn!(error = %e, "Connection closed uncleanly");
        }
        result
    }

    async fn close_inner(&self, handle: ConnectionHandle, deadline: Deadline) -> Result<(), TcpError> {
        let state = self.table.lookup(handle).await?;
        if !state.local_done() {
            match self.half_close.execute(handle, deadline).await {
                Ok(()) | Err(TcpError::BrokenPipe(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut buf = vec![0u8; self.config.connection.recv_buffer_size];
        loop {
            if !self.table.lookup(handle).await?.can_recv() {
                return Ok(());
            }
            match self.recv_inner(handle, &mut buf, deadline).await? {
                0 => return Ok(()),
                n => debug!(bytes = n, "Discarding data received while closing"),
            }
        }
    }

    /// Release `handle` and hand its stream back to the caller.
    pub async fn detach(&self, handle: ConnectionHandle) -> Result<TcpStream, TcpError> {
        let state = self.table.lookup(handle).await?;
        let stream = self
            .transport
            .detach(handle)
            .map_err(|e| TcpError::from_io(handle, e))?;
        self.table.remove(handle).await?;
        self.metrics.handle_released();
        info!(%handle, %state, "Connection detached");
        Ok(stream)
    }

    /// Current state of `handle`
    pub async fn state(&self, handle: ConnectionHandle) -> Result<ConnectionState, TcpError> {
        self.table.lookup(handle).await
    }

    /// Whether the peer's FIN has been seen on `handle`
    pub fn peer_done(&self, handle: ConnectionHandle) -> bool {
        self.transport.peer_fin_received(handle)
    }

    pub async fn active_handles(&self) -> Vec<ConnectionHandle> {
        self.table.handles().await
    }

    pub async fn get_active_connections(&self) -> usize {
        self.table.len().await
    }

    /// Deadline derived from the configured default timeout
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after(self.config.connection.default_deadline)
    }

    /// Deadline derived from the configured close timeout
    pub fn close_deadline(&self) -> Deadline {
        Deadline::after(self.config.connection.close_deadline)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }
}
