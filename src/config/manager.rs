//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config = Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(deadline) = std::env::var("HALFCLOSE_DEFAULT_DEADLINE") {
            config.connection.default_deadline = humantime::parse_duration(&deadline)
                .with_context(|| format!("Invalid HALFCLOSE_DEFAULT_DEADLINE: {}", deadline))?;
        }

        if let Ok(deadline) = std::env::var("HALFCLOSE_CLOSE_DEADLINE") {
            config.connection.close_deadline = humantime::parse_duration(&deadline)
                .with_context(|| format!("Invalid HALFCLOSE_CLOSE_DEADLINE: {}", deadline))?;
        }

        if let Ok(max_handles) = std::env::var("HALFCLOSE_MAX_HANDLES") {
            config.connection.max_handles = max_handles
                .parse::<usize>()
                .with_context(|| format!("Invalid HALFCLOSE_MAX_HANDLES: {}", max_handles))?;
        }

        if let Ok(nodelay) = std::env::var("HALFCLOSE_NODELAY") {
            config.connection.nodelay = nodelay
                .parse::<bool>()
                .with_context(|| format!("Invalid HALFCLOSE_NODELAY: {}", nodelay))?;
        }

        if let Ok(log_level) = std::env::var("HALFCLOSE_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_connection_config()
            .with_context(|| "Connection configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_connection_config(&self) -> Result<()> {
        let connection = &self.connection;

        if connection.default_deadline.is_zero() {
            bail!("default_deadline must be greater than 0");
        }

        if connection.default_deadline > Duration::from_secs(3600) {
            bail!("default_deadline cannot exceed 1 hour");
        }

        if connection.close_deadline.is_zero() {
            bail!("close_deadline must be greater than 0");
        }

        if connection.max_handles == 0 {
            bail!("max_handles must be greater than 0");
        }

        if connection.max_handles > 100000 {
            bail!("max_handles cannot exceed 100,000 for safety");
        }

        if connection.recv_buffer_size < 512 {
            bail!("recv_buffer_size must be at least 512 bytes");
        }

        if connection.recv_buffer_size > 1048576 {
            bail!("recv_buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Log level for the tracing filter: `--verbose` means debug, an explicit
    /// `--log-level` comes next, then `monitoring.log_level`.
    pub fn log_level<'a>(&'a self, cli_level: Option<&'a str>, verbose: bool) -> &'a str {
        if verbose {
            "debug"
        } else {
            cli_level.unwrap_or(self.monitoring.log_level.as_str())
        }
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, deadline: Option<Duration>, max_handles: Option<usize>) {
        if let Some(deadline) = deadline {
            self.connection.default_deadline = deadline;
            tracing::info!("CLI override: default deadline set to {:?}", deadline);
        }

        if let Some(max_handles) = max_handles {
            self.connection.max_handles = max_handles;
            tracing::info!("CLI override: max handles set to {}", max_handles);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.default_deadline, Duration::from_secs(10));
        assert_eq!(config.connection.max_handles, 1024);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = ConfigManager::parse(
            r#"
            [connection]
            default_deadline = "250ms"
            nodelay = false
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.default_deadline, Duration::from_millis(250));
        assert!(!config.connection.nodelay);
        assert_eq!(config.connection.close_deadline, Duration::from_secs(5));
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_validation_rejects_zero_handles() {
        let mut config = Config::default();
        config.connection.max_handles = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Monitoring configuration"));
    }

    #[test]
    fn test_log_level_priority() {
        let mut config = Config::default();
        config.monitoring.log_level = "warn".to_string();

        assert_eq!(config.log_level(None, false), "warn");
        assert_eq!(config.log_level(Some("trace"), false), "trace");
        assert_eq!(config.log_level(Some("trace"), true), "debug");
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some(Duration::from_secs(2)), Some(8));
        assert_eq!(config.connection.default_deadline, Duration::from_secs(2));
        assert_eq!(config.connection.max_handles, 8);

        config.merge_with_cli_args(None, None);
        assert_eq!(config.connection.max_handles, 8);
    }
}
