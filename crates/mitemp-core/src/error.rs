//! Error types for mitemp-core.
//!
//! Every error here is absorbed at the [`SensorSession`](crate::SensorSession)
//! boundary: connect failures leave the session `Disconnected`, read failures
//! turn into an invalid reading. Nothing in this module is fatal to a running
//! service.
//!
//! | Error Type | Raised by | Effect on the session |
//! |------------|-----------|-----------------------|
//! | [`Error::Timeout`] | connect, read | connect: back to `Disconnected`; read: link re-checked |
//! | [`Error::Bluetooth`] | transport | link re-checked |
//! | [`Error::NotConnected`] | read | none, reading is invalid |
//! | [`Error::DeviceNotFound`] | connect | stays `Disconnected` |
//! | [`Error::CharacteristicNotFound`] | read | none, firmware mismatch |
//! | [`Error::InvalidReadingFormat`] | decode | none, reading is invalid |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to a thermometer.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Failed to interpret data received from device.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Characteristic payload was too short.
    #[error("Invalid reading format: expected {expected} bytes, got {actual}")]
    InvalidReadingFormat {
        /// Expected data size.
        expected: usize,
        /// Actual data size received.
        actual: usize,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with the given address was not seen while scanning.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>) -> Self {
        Self::CharacteristicNotFound { uuid: uuid.into() }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<mitemp_types::ParseError> for Error {
    fn from(err: mitemp_types::ParseError) -> Self {
        match err {
            mitemp_types::ParseError::InsufficientBytes { expected, actual } => {
                Error::InvalidReadingFormat { expected, actual }
            }
            mitemp_types::ParseError::InvalidValue(msg) => Error::InvalidData(msg),
            _ => Error::InvalidData(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using mitemp-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
