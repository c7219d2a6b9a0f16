//! Connection Error Types

use std::io;
use thiserror::Error;

use crate::handle::{ConnectionHandle, ConnectionState};

/// Errors returned by handle-based connection operations
#[derive(Debug, Error)]
pub enum TcpError {
    /// Handle unknown or already fully closed
    #[error("invalid connection handle {0}")]
    InvalidHandle(ConnectionHandle),

    /// Local half of the connection is already closed
    #[error("connection {0} was already half-closed")]
    BrokenPipe(ConnectionHandle),

    /// Deadline elapsed before the operation completed
    #[error("deadline expired on connection {0}")]
    Timeout(ConnectionHandle),

    /// Explicit registration of a handle that is still live
    #[error("connection handle {0} is already registered")]
    HandleInUse(ConnectionHandle),

    /// State change that would reopen a connection
    #[error("connection {handle} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        handle: ConnectionHandle,
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Handle table is full
    #[error("handle limit of {0} reached")]
    TooManyHandles(usize),

    /// Any other transport failure
    #[error("transport failure on connection {handle}: {source}")]
    Io {
        handle: ConnectionHandle,
        #[source]
        source: io::Error,
    },
}

impl TcpError {
    /// Errno-style name of this error, as used in the function catalog
    pub fn code(&self) -> &'static str {
        match self {
            TcpError::InvalidHandle(_) => "EBADF",
            TcpError::BrokenPipe(_) => "EPIPE",
            TcpError::Timeout(_) => "ETIMEDOUT",
            TcpError::HandleInUse(_) => "EEXIST",
            TcpError::InvalidTransition { .. } => "EINVAL",
            TcpError::TooManyHandles(_) => "EMFILE",
            TcpError::Io { .. } => "EIO",
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TcpError::InvalidHandle(_) => "invalid_handle",
            TcpError::BrokenPipe(_) => "broken_pipe",
            TcpError::Timeout(_) => "timeout",
            TcpError::HandleInUse(_) => "handle_in_use",
            TcpError::InvalidTransition { .. } => "invalid_transition",
            TcpError::TooManyHandles(_) => "too_many_handles",
            TcpError::Io { .. } => "io",
        }
    }

    /// Only timeouts may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TcpError::Timeout(_))
    }

    /// Map an I/O failure on `handle` onto the closest error kind.
    pub fn from_io(handle: ConnectionHandle, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe => TcpError::BrokenPipe(handle),
            io::ErrorKind::TimedOut => TcpError::Timeout(handle),
            _ => TcpError::Io { handle, source: err },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let handle = ConnectionHandle::from_raw(7);
        assert_eq!(TcpError::InvalidHandle(handle).code(), "EBADF");
        assert_eq!(TcpError::BrokenPipe(handle).code(), "EPIPE");
        assert_eq!(TcpError::Timeout(handle).code(), "ETIMEDOUT");
        assert_eq!(TcpError::TooManyHandles(1).code(), "EMFILE");
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        let handle = ConnectionHandle::from_raw(1);
        assert!(TcpError::Timeout(handle).is_retryable());
        assert!(!TcpError::BrokenPipe(handle).is_retryable());
        assert!(!TcpError::InvalidHandle(handle).is_retryable());
    }

    #[test]
    fn test_from_io_mapping() {
        let handle = ConnectionHandle::from_raw(3);
        let err = TcpError::from_io(handle, io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, TcpError::BrokenPipe(h) if h == handle));

        let err = TcpError::from_io(handle, io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(err, TcpError::Io { .. }));
        assert_eq!(err.to_string(), format!("transport failure on connection 3: {}", io::Error::from(io::ErrorKind::ConnectionReset)));
    }
}
