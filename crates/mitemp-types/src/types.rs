//! Core types for thermometer data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Minimum number of bytes required to decode a [`Measurement`].
pub const MIN_MEASUREMENT_BYTES: usize = 3;

/// Number of bytes in the payload when battery voltage is included.
pub const FULL_MEASUREMENT_BYTES: usize = 5;

/// One decoded measurement from the temperature/humidity characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Temperature in degrees Celsius (raw value divided by 100).
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: u8,
    /// Battery voltage in millivolts, when the payload carries it.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub voltage_mv: Option<u16>,
}

impl Measurement {
    /// Decode a measurement from the raw characteristic value.
    ///
    /// The byte format is:
    /// - bytes 0-1: temperature (i16 LE, divide by 100 for Celsius)
    /// - byte 2: humidity (u8, percent)
    /// - bytes 3-4: battery voltage (u16 LE, millivolts), optional
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` contains fewer than
    /// [`MIN_MEASUREMENT_BYTES`] (3) bytes.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < MIN_MEASUREMENT_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_MEASUREMENT_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let temp_raw = buf.get_i16_le();
        let humidity = buf.get_u8();
        let voltage_mv = (buf.remaining() >= 2).then(|| buf.get_u16_le());

        Ok(Self {
            temperature: f64::from(temp_raw) / 100.0,
            humidity,
            voltage_mv,
        })
    }
}

/// Outcome of one poll of a connected sensor.
///
/// A [`Reading::Invalid`] entry means the sensor was connected but the read
/// failed; it carries no values. A sensor that is not connected produces no
/// `Reading` at all.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum Reading {
    /// The characteristic was read and decoded.
    Valid(Measurement),
    /// The read failed or the payload could not be decoded.
    Invalid,
}

impl Reading {
    /// Whether the read succeeded.
    pub fn is_valid(&self) -> bool {
        matches!(self, Reading::Valid(_))
    }

    /// The decoded measurement, if any.
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            Reading::Valid(m) => Some(m),
            Reading::Invalid => None,
        }
    }
}

impl From<Option<Measurement>> for Reading {
    fn from(value: Option<Measurement>) -> Self {
        value.map_or(Reading::Invalid, Reading::Valid)
    }
}

/// BLE connection state of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum ConnectionState {
    /// No BLE link.
    #[default]
    Disconnected = 0,
    /// A connect attempt is in flight.
    Connecting = 1,
    /// Link established and usable for reads.
    Connected = 2,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
