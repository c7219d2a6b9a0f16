//! Handle and Connection State Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide handle counter. Relaxed ordering is enough, only uniqueness matters.
static NEXT_HANDLE: AtomicI64 = AtomicI64::new(1);

/// Opaque integer identifier of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(i64);

impl ConnectionHandle {
    /// Issue a fresh handle, unique within the process lifetime.
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value, e.g. one issued by an external collaborator.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConnectionHandle {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Per-direction state of a connection.
///
/// Once the local half is closed the connection can only move on to
/// `Closed`; nothing reopens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Open,
    /// We sent FIN, the peer may still be sending.
    HalfClosedLocal,
    /// Peer sent FIN, we may still be sending.
    HalfClosedRemote,
    Closed,
}

impl ConnectionState {
    /// Whether outbound data may still be written
    pub fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::HalfClosedRemote)
    }

    /// Whether inbound data may still arrive
    pub fn can_recv(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::HalfClosedLocal)
    }

    /// Whether our FIN has already been sent
    pub fn local_done(&self) -> bool {
        matches!(self, ConnectionState::HalfClosedLocal | ConnectionState::Closed)
    }

    /// State after sending our FIN
    pub fn after_local_fin(self) -> Self {
        match self {
            ConnectionState::HalfClosedRemote | ConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::HalfClosedLocal,
        }
    }

    /// State after observing the peer's FIN
    pub fn after_remote_fin(self) -> Self {
        match self {
            ConnectionState::HalfClosedLocal | ConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::HalfClosedRemote,
        }
    }

    /// Check a transition against the no-reopen rule.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Open, _) => true,
            (from, to) if *from == to => true,
            (HalfClosedLocal, Closed) | (HalfClosedRemote, Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Open => "open",
            ConnectionState::HalfClosedLocal => "half-closed (local)",
            ConnectionState::HalfClosedRemote => "half-closed (remote)",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_handles_are_unique_and_positive() {
        let h1 = ConnectionHandle::next();
        let h2 = ConnectionHandle::next();
        assert_ne!(h1, h2);
        assert!(h1.as_raw() > 0);
        assert!(h2.as_raw() > 0);
    }

    #[test]
    fn test_local_fin_transitions() {
        assert_eq!(Open.after_local_fin(), HalfClosedLocal);
        assert_eq!(HalfClosedRemote.after_local_fin(), Closed);
        assert_eq!(HalfClosedLocal.after_local_fin(), HalfClosedLocal);
    }

    #[test]
    fn test_remote_fin_transitions() {
        assert_eq!(Open.after_remote_fin(), HalfClosedRemote);
        assert_eq!(HalfClosedLocal.after_remote_fin(), Closed);
    }

    #[test]
    fn test_half_closed_local_never_reopens() {
        assert!(!HalfClosedLocal.can_transition_to(Open));
        assert!(!HalfClosedLocal.can_transition_to(HalfClosedRemote));
        assert!(HalfClosedLocal.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Open));
        assert!(Open.can_transition_to(HalfClosedLocal));
    }

    #[test]
    fn test_direction_predicates() {
        assert!(Open.can_send() && Open.can_recv());
        assert!(!HalfClosedLocal.can_send() && HalfClosedLocal.can_recv());
        assert!(HalfClosedRemote.can_send() && !HalfClosedRemote.can_recv());
        assert!(Closed.local_done() && !Closed.can_send());
    }
}
