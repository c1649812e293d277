//! Error types for data parsing in mitemp-types.

use thiserror::Error;

/// Errors that can occur when decoding thermometer payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in mitemp-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload was shorter than the fixed layout requires.
    #[error("Measurement requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A value could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using mitemp-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
