//! Handle Module
//!
//! Connection handles, their per-direction state, and the table that owns
//! every live handle.

pub mod table;
pub mod types;

pub use table::{HandleEntry, HandleTable};
pub use types::{ConnectionHandle, ConnectionState};
