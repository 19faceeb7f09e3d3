//! Configuration management for the EM540 exporter
//!
//! This module handles loading and validation of the exporter configuration
//! from YAML files. Every field has a default matching a stock EM540 on a
//! USB RS-485 adapter, so a file only needs the fields that differ.

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Modbus RTU serial link configuration
    pub serial: SerialConfig,

    /// Scrape endpoint binding configuration
    pub web: WebConfig,

    /// Metric naming configuration
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Delay between poll iterations in milliseconds
    pub poll_interval_ms: u64,
}

/// Modbus RTU serial link parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Modbus slave/unit id of the meter
    pub unit_id: u8,

    /// Parity (none, even, odd)
    pub parity: String,

    /// Data bits (5..=8)
    pub data_bits: u8,

    /// Stop bits (1 or 2)
    pub stop_bits: u8,

    /// Upper bound for a single register read in milliseconds
    pub read_timeout_ms: u64,
}

/// Scrape endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Metric naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix prepended to every exported metric name
    pub namespace: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Default locations searched by [`Config::load`]
    pub const DEFAULT_PATHS: [&'static str; 2] =
        ["em540_exporter.yaml", "/etc/em540-exporter/config.yaml"];

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from an explicit path, or the first default location that
    /// exists, or fall back to built-in defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::DEFAULT_PATHS.iter().find(|p| Path::new(p).exists()) {
                Some(p) => Self::from_file(p)?,
                None => Config::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(ExporterError::validation(
                "serial.port",
                "Serial device path cannot be empty",
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ExporterError::validation(
                "serial.baud_rate",
                "Must be greater than 0",
            ));
        }

        // 0 is broadcast and 248..=255 are reserved on a Modbus serial line
        if !(1..=247).contains(&self.serial.unit_id) {
            return Err(ExporterError::validation(
                "serial.unit_id",
                "Must be between 1 and 247",
            ));
        }

        if !matches!(
            self.serial.parity.to_lowercase().as_str(),
            "none" | "even" | "odd"
        ) {
            return Err(ExporterError::validation(
                "serial.parity",
                "Must be one of none, even, odd",
            ));
        }

        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ExporterError::validation(
                "serial.data_bits",
                "Must be between 5 and 8",
            ));
        }

        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(ExporterError::validation(
                "serial.stop_bits",
                "Must be 1 or 2",
            ));
        }

        if self.serial.read_timeout_ms == 0 {
            return Err(ExporterError::validation(
                "serial.read_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.web.port == 0 {
            return Err(ExporterError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if self.metrics.namespace.is_empty()
            || !self
                .metrics
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ExporterError::validation(
                "metrics.namespace",
                "Must be a non-empty [A-Za-z0-9_] identifier",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ExporterError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.port, "/dev/ttyUSB_em540");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.unit_id, 1);
        assert_eq!(config.web.port, 3725);
        assert_eq!(config.metrics.namespace, "em540");
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.serial.port = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.serial.unit_id = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.serial.parity = "mark".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.metrics.namespace = "em-540".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("serial:\n  port: /dev/ttyAMA0\n").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.web.port, 3725);
    }
}
