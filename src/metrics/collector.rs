//! Metrics Collector

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

use crate::error::TcpError;

/// Collects connection lifecycle metrics and exports them
pub struct Metrics {
    registry: Registry,
    handles_active: IntGauge,
    fin_sent_total: IntCounter,
    failures_total: IntCounterVec,
    bytes_sent_total: IntCounter,
    bytes_received_total: IntCounter,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let handles_active = IntGauge::new(
            "halfclose_handles_active",
            "Number of connection handles currently registered",
        )?;
        let fin_sent_total = IntCounter::new(
            "halfclose_fin_sent_total",
            "Total FIN segments sent by half-close",
        )?;
        let failures_total = IntCounterVec::new(
            Opts::new("halfclose_failures_total", "Failed connection operations by kind"),
            &["kind"],
        )?;
        let bytes_sent_total = IntCounter::new(
            "halfclose_bytes_sent_total",
            "Total bytes written through handles",
        )?;
        let bytes_received_total = IntCounter::new(
            "halfclose_bytes_received_total",
            "Total bytes read through handles",
        )?;

        registry.register(Box::new(handles_active.clone()))?;
        registry.register(Box::new(fin_sent_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(bytes_sent_total.clone()))?;
        registry.register(Box::new(bytes_received_total.clone()))?;

        Ok(Self {
            registry,
            handles_active,
            fin_sent_total,
            failures_total,
            bytes_sent_total,
            bytes_received_total,
        })
    }

    pub fn handle_attached(&self) {
        self.handles_active.inc();
    }

    pub fn handle_released(&self) {
        self.handles_active.dec();
    }

    pub fn fin_sent(&self) {
        self.fin_sent_total.inc();
    }

    pub fn record_failure(&self, err: &TcpError) {
        self.failures_total.with_label_values(&[err.kind()]).inc();
    }

    pub fn bytes_sent(&self, bytes: usize) {
        self.bytes_sent_total.inc_by(bytes as u64);
    }

    pub fn bytes_received(&self, bytes: usize) {
        self.bytes_received_total.inc_by(bytes as u64);
    }

    pub fn get_handles_active(&self) -> i64 {
        self.handles_active.get()
    }

    pub fn get_fins_sent(&self) -> u64 {
        self.fin_sent_total.get()
    }

    /// Failures recorded for one error kind (see [`TcpError::kind`])
    pub fn get_failures(&self, kind: &str) -> u64 {
        self.failures_total.with_label_values(&[kind]).get()
    }

    pub fn get_bytes_sent(&self) -> u64 {
        self.bytes_sent_total.get()
    }

    pub fn get_bytes_received(&self) -> u64 {
        self.bytes_received_total.get()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ConnectionHandle;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.handle_attached();
        metrics.handle_attached();
        metrics.handle_released();
        metrics.fin_sent();
        metrics.bytes_sent(10);
        metrics.bytes_received(4);

        assert_eq!(metrics.get_handles_active(), 1);
        assert_eq!(metrics.get_fins_sent(), 1);
        assert_eq!(metrics.get_bytes_sent(), 10);
        assert_eq!(metrics.get_bytes_received(), 4);
    }

    #[test]
    fn test_failures_by_kind() {
        let metrics = Metrics::new().unwrap();
        let handle = ConnectionHandle::from_raw(1);
        metrics.record_failure(&TcpError::BrokenPipe(handle));
        metrics.record_failure(&TcpError::BrokenPipe(handle));
        metrics.record_failure(&TcpError::Timeout(handle));

        assert_eq!(metrics.get_failures("broken_pipe"), 2);
        assert_eq!(metrics.get_failures("timeout"), 1);
        assert_eq!(metrics.get_failures("invalid_handle"), 0);
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.fin_sent();
        let output = metrics.export_prometheus();
        assert!(output.contains("halfclose_fin_sent_total 1"));
        assert!(output.contains("halfclose_handles_active"));
    }
}
