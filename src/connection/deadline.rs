//! Operation Deadlines

use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, timeout_at, Instant};

/// Point in time after which a blocking operation gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Block for as long as it takes
    Infinite,
    At(Instant),
}

impl Deadline {
    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Deadline::At(Instant::now() + duration)
    }

    /// Deadline that has already passed; operations must not block.
    pub fn immediate() -> Self {
        Deadline::At(Instant::now())
    }

    /// Millisecond convention of C socket libraries: negative blocks
    /// forever, zero does not block at all.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => Deadline::Infinite,
            0 => Deadline::immediate(),
            ms => Deadline::after(Duration::from_millis(ms as u64)),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self {
            Deadline::Infinite => false,
            Deadline::At(at) => *at <= Instant::now(),
        }
    }

    /// Time left, `None` when infinite
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Infinite => None,
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Drive `future` until it completes or the deadline passes.
    ///
    /// The future is polled once even when the deadline has already
    /// expired, so work that is ready right away still completes.
    pub async fn run<F: Future>(self, future: F) -> Result<F::Output, Elapsed> {
        match self {
            Deadline::Infinite => Ok(future.await),
            Deadline::At(at) => timeout_at(at, future).await,
        }
    }
}

impl From<Duration> for Deadline {
    fn from(duration: Duration) -> Self {
        Deadline::after(duration)
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Deadline::Infinite, Deadline::after)
    }
}
