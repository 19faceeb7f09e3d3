//! # em540-exporter - Prometheus exporter for Carlo Gavazzi EM530/EM540 meters
//!
//! Polls a three-phase energy meter over Modbus RTU and republishes the
//! decoded measurements as labeled gauges for Prometheus to scrape.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `modbus`: Modbus RTU client and block fetcher
//! - `payload`: Register blocks and the word-order-aware decode cursor
//! - `register_map`: EM540 register groups and their field layouts
//! - `identity`: Startup device identification
//! - `metrics`: Metric sinks (Prometheus registry, in-memory)
//! - `poller`: Fetch-decode-publish loop
//! - `web`: `/metrics` scrape endpoint

pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod modbus;
pub mod payload;
pub mod poller;
pub mod register_map;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExporterError, Result};
pub use poller::Poller;

/// Version reported in the startup banner
pub const APP_VERSION: &str = env!("APP_VERSION");
