//! Error types and handling for the EM540 exporter
//!
//! This module defines the error types used throughout the exporter,
//! separating serial-link failures from register-map mismatches so the poll
//! loop can decide what is fatal and what only skips an iteration.

use thiserror::Error;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the exporter
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Modbus transport errors (I/O, framing/CRC, exception responses)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A register read did not complete in time
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// A decode step ran past the end of the fetched register block
    #[error(
        "Truncated payload: need {needed} word(s) at offset {offset}, block holds {len}"
    )]
    TruncatedPayload {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// A block read answered with a different number of words than requested
    #[error("Block length mismatch at {start:#06x}: requested {expected} word(s), got {actual}")]
    BlockLength {
        start: u16,
        expected: usize,
        actual: usize,
    },

    /// A code read from the device is missing from a lookup table
    #[error("Unknown {table} code: {code:#06x}")]
    UnknownDeviceCode { table: &'static str, code: u16 },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// HTTP server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Metrics registry errors
    #[error("Metrics error: {message}")]
    Metrics { message: String },
}

impl ExporterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ExporterError::Config {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        ExporterError::Transport {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ExporterError::Timeout {
            message: message.into(),
        }
    }

    /// Create a truncated payload error
    pub fn truncated(offset: usize, needed: usize, len: usize) -> Self {
        ExporterError::TruncatedPayload {
            offset,
            needed,
            len,
        }
    }

    /// Create a block length mismatch error
    pub fn block_length(start: u16, expected: usize, actual: usize) -> Self {
        ExporterError::BlockLength {
            start,
            expected,
            actual,
        }
    }

    /// Create an unknown code error for the named lookup table
    pub fn unknown_code(table: &'static str, code: u16) -> Self {
        ExporterError::UnknownDeviceCode { table, code }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ExporterError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ExporterError::Io {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        ExporterError::Web {
            message: message.into(),
        }
    }

    /// Create a new metrics error
    pub fn metrics<S: Into<String>>(message: S) -> Self {
        ExporterError::Metrics {
            message: message.into(),
        }
    }

    /// Whether the poll loop may skip this error and try again next cycle.
    ///
    /// Link failures and register-map mismatches only cost one iteration;
    /// everything else belongs to startup and is fatal there.
    pub fn is_poll_recoverable(&self) -> bool {
        matches!(
            self,
            ExporterError::Transport { .. }
                | ExporterError::Timeout { .. }
                | ExporterError::TruncatedPayload { .. }
                | ExporterError::BlockLength { .. }
        )
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ExporterError {
    fn from(err: serde_yaml::Error) -> Self {
        ExporterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<prometheus::Error> for ExporterError {
    fn from(err: prometheus::Error) -> Self {
        ExporterError::metrics(err.to_string())
    }
}

impl From<tokio_modbus::Error> for ExporterError {
    fn from(err: tokio_modbus::Error) -> Self {
        ExporterError::transport(err.to_string())
    }
}
