//! Error types

use std::io;
use thiserror::Error;

use crate::types::{DeviceId, ErrorCode};

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors that can occur while talking to a UWB device
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// No device at the given address
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Serial link failure (open, read, write)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The device answered but reported that the operation failed
    #[error("Device reported failure during {operation}")]
    OperationFailed { operation: String, code: Option<ErrorCode> },

    /// No reply within the allotted time
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Backend cannot perform this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Rejected setting value
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// The error code register itself could not be read
    #[error("Diagnostics unavailable: {0}")]
    DiagnosticsUnavailable(String),
}

impl DeviceError {
    pub fn failed(operation: impl Into<String>) -> Self {
        DeviceError::OperationFailed {
            operation: operation.into(),
            code: None,
        }
    }

    pub fn failed_with(operation: impl Into<String>, code: ErrorCode) -> Self {
        DeviceError::OperationFailed {
            operation: operation.into(),
            code: Some(code),
        }
    }

    /// Check if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeviceError::Timeout(_) | DeviceError::OperationFailed { .. }
        )
    }

    /// Error code attached by the device, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DeviceError::OperationFailed { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<io::Error> for DeviceError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                DeviceError::Timeout(err.to_string())
            }
            io::ErrorKind::NotFound => DeviceError::DeviceNotFound(err.to_string()),
            _ => DeviceError::Transport(err.to_string()),
        }
    }
}

/// One failed ranging exchange.
///
/// `timestamp_ms` is the device clock reported alongside the failure, or 0
/// when the device never produced a range record.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Ranging with {target} failed: {cause}")]
pub struct RangingFailure {
    pub target: DeviceId,
    pub timestamp_ms: u32,
    #[source]
    pub cause: DeviceError,
}

impl RangingFailure {
    pub fn new(target: DeviceId, timestamp_ms: u32, cause: DeviceError) -> Self {
        Self {
            target,
            timestamp_ms,
            cause,
        }
    }
}

/// Error type for configuration operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("config not found: {0}")]
    NotFound(String),

    #[error("failed to read config: {0}")]
    ReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config: {0}")]
    ValidationError(String),
}
