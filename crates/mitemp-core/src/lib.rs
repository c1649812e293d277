//! Core BLE library for Xiaomi Mijia LYWSD03MMC thermometers.
//!
//! This crate owns everything that talks to the radio: discovering
//! thermometers, holding one link per sensor, and reading temperature,
//! humidity and battery level over GATT.
//!
//! # Features
//!
//! - **Device discovery**: Scan for nearby thermometers via BLE
//! - **Sensor sessions**: One guarded link per sensor with connect and read timeouts
//! - **Registry**: Connect a fixed set of sensors concurrently, reconnect them when they drop
//! - **Mock transport**: Exercise everything above without hardware
//!
//! # Platform Differences
//!
//! On macOS, CoreBluetooth hides hardware addresses and identifies peripherals
//! by a per-host UUID. Scan results report that UUID as the identifier, and
//! peripheral lookup matches either form.
//!
//! # Quick Start
//!
//! ```no_run
//! use mitemp_core::{SensorSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SensorSession::ble("kitchen", "A4:C1:38:F0:16:49", SessionConfig::default());
//!     session.connect().await?;
//!
//!     let measurement = session.read_measurement().await?;
//!     println!("{:.1} °C, {} %", measurement.temperature, measurement.humidity);
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod error;
pub mod mock;
pub mod registry;
pub mod scan;
pub mod session;
pub mod transport;
pub mod util;

pub use mitemp_types::types;
pub use mitemp_types::uuid;

pub use ble::BleTransport;
pub use error::{DeviceNotFoundReason, Error, Result};
pub use mock::{MockTransport, MockTransportBuilder};
pub use registry::{ConnectReport, RegistryConfig, SensorRegistry};
pub use scan::{DiscoveredSensor, ScanOptions};
pub use session::{ConnectOutcome, SensorSession, SessionConfig};
pub use transport::GattTransport;
pub use util::{addresses_match, format_peripheral_id, is_valid_address, normalize_address};

pub use mitemp_types::uuid as uuids;
pub use mitemp_types::{ConnectionState, Measurement, Reading};
