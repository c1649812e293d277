//! Bluetooth UUIDs for LYWSD03MMC thermometers.

use uuid::{Uuid, uuid};

/// Standard battery level characteristic (0-100 %).
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Combined temperature/humidity/voltage characteristic (Xiaomi vendor UUID).
///
/// Payload layout: `i16` LE temperature x100, `u8` humidity, optionally
/// `u16` LE battery voltage in millivolts.
pub const TEMPERATURE_HUMIDITY: Uuid = uuid!("ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Xiaomi vendor service that carries [`TEMPERATURE_HUMIDITY`].
pub const XIAOMI_DATA_SERVICE: Uuid = uuid!("ebe0ccb0-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Advertised local name of the thermometer.
pub const ADVERTISED_NAME: &str = "LYWSD03MMC";
