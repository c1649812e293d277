//! Platform-agnostic types for Xiaomi LYWSD03MMC BLE thermometers.
//!
//! This crate holds the pieces shared by the BLE library (`mitemp-core`) and
//! the broadcast service (`mitemp-service`):
//!
//! - Decoding of the combined temperature/humidity characteristic
//! - The per-sensor connection state machine's states
//! - UUID constants for the BLE characteristics
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use mitemp_types::Measurement;
//!
//! let measurement = Measurement::from_bytes(&[0xD0, 0x07, 0x32]).unwrap();
//! assert_eq!(measurement.temperature, 20.0);
//! assert_eq!(measurement.humidity, 50);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{ConnectionState, Measurement, Reading};
pub use self::uuid as uuids;
