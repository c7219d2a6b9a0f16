//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub monitoring: MonitoringConfig,
}

/// Connection handling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline applied to send, recv and done when the caller has none
    #[serde(with = "humantime_serde")]
    pub default_deadline: Duration,
    /// How long a full close waits for the peer's FIN
    #[serde(with = "humantime_serde")]
    pub close_deadline: Duration,
    pub max_handles: usize,
    pub nodelay: bool,
    pub recv_buffer_size: usize,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(10),
            close_deadline: Duration::from_secs(5),
            max_handles: 1024,
            nodelay: true,
            recv_buffer_size: 8192,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
