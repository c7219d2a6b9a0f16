//! Half-Close Operation
//!
//! Closes the outbound direction of a connection: validates the handle,
//! sends a FIN through the transport within the deadline, and records the
//! new state. The per-handle lock is held from the state check until the
//! new state is written, so concurrent calls on one handle send one FIN.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::Deadline;
use crate::error::TcpError;
use crate::handle::table::transition;
use crate::handle::{ConnectionHandle, HandleTable};
use crate::metrics::Metrics;
use crate::transport::Transport;

pub struct HalfCloseOperation<T: Transport + ?Sized> {
    table: Arc<HandleTable>,
    transport: Arc<T>,
    metrics: Option<Arc<Metrics>>,
}

impl<T: Transport + ?Sized> HalfCloseOperation<T> {
    pub fn new(table: Arc<HandleTable>, transport: Arc<T>) -> Self {
        Self {
            table,
            transport,
            metrics: None,
        }
    }

    /// Record FINs and failures in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Half-close `handle`.
    ///
    /// Fails with `InvalidHandle` for an unknown handle, `BrokenPipe` when
    /// our FIN was already sent, and `Timeout` when the deadline passes
    /// before the FIN is out. A deadline that has already passed fails
    /// without touching the transport. On failure the state is unchanged.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn execute(&self, handle: ConnectionHandle, deadline: Deadline) -> Result<(), TcpError> {
        let result = self.half_close(handle, deadline).await;
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(()) => metrics.fin_sent(),
                Err(e) => metrics.record_failure(e),
            }
        }
        result
    }

    async fn half_close(&self, handle: ConnectionHandle, deadline: Deadline) -> Result<(), TcpError> {
        let entry = self.table.entry(handle).await?;
        let mut state = deadline.run(entry.lock_owned()).await.map_err(|_| {
            warn!("Deadline expired waiting for connection lock");
            TcpError::Timeout(handle)
        })?;

        let current = *state;
        if current.local_done() {
            debug!(state = %current, "Connection already half-closed");
            return Err(TcpError::BrokenPipe(handle));
        }
        if deadline.is_expired() {
            debug!("Deadline already expired, FIN not sent");
            return Err(TcpError::Timeout(handle));
        }

        match deadline.run(self.transport.send_fin(handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to send FIN");
                return Err(TcpError::from_io(handle, e));
            }
            Err(_) => {
                warn!("Deadline expired before FIN was sent");
                return Err(TcpError::Timeout(handle));
            }
        }

        let mut next = current.after_local_fin();
        if self.transport.peer_fin_received(handle) {
            next = next.after_remote_fin();
        }
        transition(handle, &mut *state, next)?;
        debug!(state = %next, "Connection half-closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ConnectionState;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedTransport {
        fins: AtomicUsize,
        delay: Duration,
        peer_fin: AtomicBool,
        fail_with: Option<io::ErrorKind>,
    }

    impl ScriptedTransport {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send_fin(&self, _handle: ConnectionHandle) -> io::Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(kind) = self.fail_with {
                return Err(io::Error::from(kind));
            }
            self.fins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn peer_fin_received(&self, _handle: ConnectionHandle) -> bool {
            self.peer_fin.load(Ordering::SeqCst)
        }
    }

    async fn setup(
        transport: ScriptedTransport,
        raw: i64,
        state: ConnectionState,
    ) -> (Arc<HandleTable>, Arc<ScriptedTransport>, HalfCloseOperation<ScriptedTransport>, ConnectionHandle) {
        let table = Arc::new(HandleTable::new());
        let transport = Arc::new(transport);
        let handle = ConnectionHandle::from_raw(raw);
        table.register(handle, state).await.unwrap();
        let op = HalfCloseOperation::new(Arc::clone(&table), Arc::clone(&transport));
        (table, transport, op, handle)
    }

    #[tokio::test]
    async fn test_open_handle_becomes_half_closed_local() {
        let (table, transport, op, handle) =
            setup(ScriptedTransport::default(), 5, ConnectionState::Open).await;

        op.execute(handle, Deadline::after(Duration::from_secs(1))).await.unwrap();

        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::HalfClosedLocal);
        assert_eq!(transport.fins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_half_closed_local_is_broken_pipe() {
        let (table, transport, op, handle) =
            setup(ScriptedTransport::default(), 5, ConnectionState::HalfClosedLocal).await;

        let result = op.execute(handle, Deadline::after(Duration::from_secs(1))).await;

        assert!(matches!(result, Err(TcpError::BrokenPipe(h)) if h == handle));
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::HalfClosedLocal);
        assert_eq!(transport.fins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_execute_is_broken_pipe() {
        let (_table, transport, op, handle) =
            setup(ScriptedTransport::default(), 11, ConnectionState::Open).await;

        op.execute(handle, Deadline::Infinite).await.unwrap();
        let second = op.execute(handle, Deadline::Infinite).await;

        assert!(matches!(second, Err(TcpError::BrokenPipe(_))));
        assert_eq!(transport.fins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_is_broken_pipe() {
        let (_table, _transport, op, handle) =
            setup(ScriptedTransport::default(), 12, ConnectionState::Closed).await;

        let result = op.execute(handle, Deadline::Infinite).await;
        assert!(matches!(result, Err(TcpError::BrokenPipe(_))));
    }

    #[tokio::test]
    async fn test_never_issued_handle_is_invalid() {
        let (_table, transport, op, _handle) =
            setup(ScriptedTransport::default(), 13, ConnectionState::Open).await;

        let result = op.execute(ConnectionHandle::from_raw(-1), Deadline::Infinite).await;

        assert!(matches!(result, Err(TcpError::InvalidHandle(h)) if h.as_raw() == -1));
        assert_eq!(transport.fins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_send() {
        let (table, transport, op, handle) =
            setup(ScriptedTransport::default(), 14, ConnectionState::Open).await;

        let result = op.execute(handle, Deadline::immediate()).await;

        assert!(matches!(result, Err(TcpError::Timeout(_))));
        assert_eq!(transport.fins.load(Ordering::SeqCst), 0);
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_slow_send_times_out() {
        let transport = ScriptedTransport::with_delay(Duration::from_millis(500));
        let (table, transport, op, handle) = setup(transport, 15, ConnectionState::Open).await;

        let result = op.execute(handle, Deadline::after(Duration::from_millis(20))).await;

        assert!(matches!(result, Err(TcpError::Timeout(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(transport.fins.load(Ordering::SeqCst), 0);
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_peer_already_done_closes() {
        let (table, _transport, op, handle) =
            setup(ScriptedTransport::default(), 16, ConnectionState::HalfClosedRemote).await;

        op.execute(handle, Deadline::Infinite).await.unwrap();
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_transport_reported_peer_fin_closes() {
        let transport = ScriptedTransport::default();
        transport.peer_fin.store(true, Ordering::SeqCst);
        let (table, _transport, op, handle) = setup(transport, 17, ConnectionState::Open).await;

        op.execute(handle, Deadline::Infinite).await.unwrap();
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_state() {
        let transport = ScriptedTransport {
            fail_with: Some(io::ErrorKind::ConnectionReset),
            ..Default::default()
        };
        let (table, _transport, op, handle) = setup(transport, 18, ConnectionState::Open).await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let op = op.with_metrics(Arc::clone(&metrics));

        let result = op.execute(handle, Deadline::Infinite).await;

        assert!(matches!(result, Err(TcpError::Io { .. })));
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::Open);
        assert_eq!(metrics.get_failures("io"), 1);
        assert_eq!(metrics.get_fins_sent(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_execute_sends_one_fin() {
        let transport = ScriptedTransport::with_delay(Duration::from_millis(50));
        let (table, transport, op, handle) = setup(transport, 19, ConnectionState::Open).await;
        let op = Arc::new(op);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let op = Arc::clone(&op);
            tasks.push(tokio::spawn(async move {
                op.execute(handle, Deadline::after(Duration::from_secs(5))).await
            }));
        }

        let mut successes = 0;
        let mut broken_pipes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => successes += 1,
                Err(TcpError::BrokenPipe(_)) => broken_pipes += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(broken_pipes, 7);
        assert_eq!(transport.fins.load(Ordering::SeqCst), 1);
        assert_eq!(table.lookup(handle).await.unwrap(), ConnectionState::HalfClosedLocal);
    }
}
