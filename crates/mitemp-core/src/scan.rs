//! Device discovery and scanning.
//!
//! Used by the `scan` command to list thermometers in range, and by
//! [`BleTransport`](crate::BleTransport) to resolve a configured address to a
//! btleplug peripheral before connecting.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::{addresses_match, format_peripheral_id};
use mitemp_types::uuid::{ADVERTISED_NAME, XIAOMI_DATA_SERVICE};

/// Information about a discovered BLE device.
#[derive(Debug, Clone)]
pub struct DiscoveredSensor {
    /// Advertised name (e.g., "LYWSD03MMC").
    pub name: Option<String>,
    /// The BLE address as a string (zeros on macOS, use `identifier` instead).
    pub address: String,
    /// Peripheral ID on macOS, address elsewhere.
    pub identifier: String,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
    /// Whether the advertisement looks like a Xiaomi thermometer.
    pub is_thermometer: bool,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Only return devices that appear to be thermometers.
    pub thermometers_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            thermometers_only: true,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Scan for all BLE devices, not just thermometers.
    pub fn all_devices(mut self) -> Self {
        self.thermometers_only = false;
        self
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for devices with custom options.
///
/// An empty list means nothing was found; it is not an error.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredSensor>> {
    let adapter = get_adapter().await?;

    info!(
        "Starting BLE scan for {} seconds...",
        options.duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match describe_peripheral(&peripheral).await {
            Ok(Some(sensor)) if sensor.is_thermometer || !options.thermometers_only => {
                debug!(address = %sensor.address, name = ?sensor.name, "Discovered device");
                discovered.push(sensor);
            }
            Ok(_) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

async fn describe_peripheral(peripheral: &Peripheral) -> Result<Option<DiscoveredSensor>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let address = properties.address.to_string();
    let identifier = if address == "00:00:00:00:00:00" {
        format_peripheral_id(&peripheral.id())
    } else {
        address.clone()
    };

    Ok(Some(DiscoveredSensor {
        name: properties.local_name.clone(),
        is_thermometer: is_thermometer(&properties),
        address,
        identifier,
        rssi: properties.rssi,
    }))
}

/// Check whether advertised properties belong to a LYWSD03MMC.
fn is_thermometer(properties: &PeripheralProperties) -> bool {
    if properties
        .local_name
        .as_deref()
        .is_some_and(|name| name.contains(ADVERTISED_NAME))
    {
        return true;
    }

    properties
        .services
        .iter()
        .chain(properties.service_data.keys())
        .any(|uuid| *uuid == XIAOMI_DATA_SERVICE)
}

/// Resolve a hardware address to a peripheral on `adapter`.
///
/// Peripherals already known to the adapter are checked first. Otherwise up
/// to three scans of increasing length are run, since advertisements are
/// easily missed.
pub async fn find_peripheral(
    adapter: &Adapter,
    address: &str,
    scan_duration: Duration,
) -> Result<Peripheral> {
    if let Some(peripheral) = find_known_peripheral(adapter, address).await? {
        debug!("Found device in cache (no scan needed)");
        return Ok(peripheral);
    }

    let max_attempts: u32 = 3;
    let base_duration = scan_duration.max(Duration::from_secs(2));

    for attempt in 1..=max_attempts {
        let duration = base_duration * attempt;
        debug!(
            "Scan attempt {}/{} ({}s)...",
            attempt,
            max_attempts,
            duration.as_secs()
        );

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = find_known_peripheral(adapter, address).await? {
            debug!("Found device on attempt {}", attempt);
            return Ok(peripheral);
        }
    }

    warn!(
        "Device not found after {} attempts: {}",
        max_attempts, address
    );
    Err(Error::device_not_found(address))
}

async fn find_known_peripheral(adapter: &Adapter, address: &str) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };

        if addresses_match(&props.address.to_string(), address) {
            return Ok(Some(peripheral));
        }

        // macOS hides addresses behind peripheral UUIDs
        if format_peripheral_id(&peripheral.id()).eq_ignore_ascii_case(address) {
            return Ok(Some(peripheral));
        }
    }

    Ok(None)
}
