//! Connection Module
//!
//! Handle-based TCP operations: the connection manager, the half-close
//! operation behind `tcp_done`, and operation deadlines.

pub mod deadline;
pub mod half_close;
pub mod manager;

pub use deadline::Deadline;
pub use half_close::HalfCloseOperation;
pub use manager::ConnectionManager;
