//! Metrics Module
//!
//! Prometheus counters for handle lifecycle, FINs, failures and bytes.

pub mod collector;

pub use collector::Metrics;
