//! halfclose Library
//!
//! Connection handle registry for TCP streams with deadline-bounded
//! half-close (`tcp_done`), full close and detach, plus the read-only
//! function catalog describing that API.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod echo;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod transport;

pub use catalog::FunctionCatalog;
pub use config::Config;
pub use connection::{ConnectionManager, Deadline, HalfCloseOperation};
pub use error::TcpError;
pub use handle::{ConnectionHandle, ConnectionState, HandleTable};
pub use transport::{TcpTransport, Transport};

/// Common error type for application-level code
pub type Result<T> = anyhow::Result<T>;
