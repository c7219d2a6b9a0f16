//! Handle Table Implementation

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{ConnectionHandle, ConnectionState};
use crate::error::TcpError;

/// A single table entry. Locking it serializes all state changes of one
/// connection without touching any other.
pub type HandleEntry = Arc<Mutex<ConnectionState>>;

/// Maps live connection handles to their state
///
/// The map lock is only held long enough to find, insert or remove an entry,
/// never across I/O.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: RwLock<HashMap<ConnectionHandle, HandleEntry>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh handle for a new connection in `state`.
    pub async fn insert(&self, state: ConnectionState) -> ConnectionHandle {
        let handle = ConnectionHandle::next();
        self.entries
            .write()
            .await
            .insert(handle, Arc::new(Mutex::new(state)));
        debug!(%handle, %state, "Registered connection handle");
        handle
    }

    /// Issue a fresh handle unless `max` handles are already live.
    ///
    /// The count and the insert happen under one write lock, so concurrent
    /// callers can never push the table past `max`.
    pub async fn insert_bounded(
        &self,
        state: ConnectionState,
        max: usize,
    ) -> Result<ConnectionHandle, TcpError> {
        let mut entries = self.entries.write().await;
        if entries.len() >= max {
            return Err(TcpError::TooManyHandles(max));
        }
        let handle = ConnectionHandle::next();
        entries.insert(handle, Arc::new(Mutex::new(state)));
        debug!(%handle, %state, "Registered connection handle");
        Ok(handle)
    }

    /// Register a handle issued by someone else.
    pub async fn register(
        &self,
        handle: ConnectionHandle,
        state: ConnectionState,
    ) -> Result<(), TcpError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&handle) {
            return Err(TcpError::HandleInUse(handle));
        }
        entries.insert(handle, Arc::new(Mutex::new(state)));
        debug!(%handle, %state, "Registered external connection handle");
        Ok(())
    }

    /// Get the lockable entry for `handle`.
    pub async fn entry(&self, handle: ConnectionHandle) -> Result<HandleEntry, TcpError> {
        self.entries
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or(TcpError::InvalidHandle(handle))
    }

    /// Current state of `handle`
    pub async fn lookup(&self, handle: ConnectionHandle) -> Result<ConnectionState, TcpError> {
        let entry = self.entry(handle).await?;
        let state = *entry.lock().await;
        Ok(state)
    }

    /// Overwrite the state of `handle`, rejecting transitions that would reopen it.
    pub async fn set_state(
        &self,
        handle: ConnectionHandle,
        new_state: ConnectionState,
    ) -> Result<(), TcpError> {
        let entry = self.entry(handle).await?;
        let mut state = entry.lock().await;
        transition(handle, &mut state, new_state)
    }

    /// Drop `handle` from the table, returning its last state.
    pub async fn remove(&self, handle: ConnectionHandle) -> Result<ConnectionState, TcpError> {
        let entry = self
            .entries
            .write()
            .await
            .remove(&handle)
            .ok_or(TcpError::InvalidHandle(handle))?;
        let state = *entry.lock().await;
        debug!(%handle, %state, "Removed connection handle");
        Ok(state)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of all live handles, in ascending order
    pub async fn handles(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<_> = self.entries.read().await.keys().copied().collect();
        handles.sort();
        handles
    }
}

/// Apply a validated state change through an already locked entry.
pub(crate) fn transition(
    handle: ConnectionHandle,
    state: &mut ConnectionState,
    next: ConnectionState,
) -> Result<(), TcpError> {
    if !state.can_transition_to(next) {
        return Err(TcpError::InvalidTransition {
            handle,
            from: *state,
            to: next,
        });
    }
    let from = *state;
    if from != next {
        trace!(%handle, %from, to = %next, "Connection state change");
        *state = next;
    }
    Ok(())
}
