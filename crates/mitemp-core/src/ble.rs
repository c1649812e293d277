//! btleplug-backed [`GattTransport`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scan::{find_peripheral, get_adapter};
use crate::transport::GattTransport;

/// Default time spent looking for the peripheral before connecting.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// An open (or opening) link to a peripheral.
struct Link {
    /// Keeps the adapter alive for as long as the peripheral is in use.
    _adapter: Adapter,
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
}

/// A real BLE link to one thermometer.
///
/// The adapter is acquired lazily on [`connect`](GattTransport::connect), so
/// constructing a transport never touches the radio.
pub struct BleTransport {
    address: String,
    scan_duration: Duration,
    link: RwLock<Option<Link>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("address", &self.address)
            .field("scan_duration", &self.scan_duration)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Create a transport for the device at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            scan_duration: DEFAULT_SCAN_DURATION,
            link: RwLock::new(None),
        }
    }

    /// Set how long to scan for the peripheral when it is not already known.
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }
}

#[async_trait]
impl GattTransport for BleTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<()> {
        let adapter = get_adapter().await?;
        let peripheral = find_peripheral(&adapter, &self.address, self.scan_duration).await?;

        // Store the link before connecting so an abandoned attempt can
        // still be torn down by disconnect().
        *self.link.write().await = Some(Link {
            _adapter: adapter,
            peripheral: peripheral.clone(),
            characteristics: HashMap::new(),
        });

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for characteristic in service.characteristics {
                characteristics.insert(characteristic.uuid, characteristic);
            }
        }
        debug!("Cached {} characteristics", characteristics.len());

        if let Some(link) = self.link.write().await.as_mut() {
            link.characteristics = characteristics;
        }

        info!(address = %self.address, "BLE link established");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(link) = self.link.write().await.take() else {
            return Ok(());
        };

        if link.peripheral.is_connected().await.unwrap_or(false) {
            link.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let peripheral = match self.link.read().await.as_ref() {
            Some(link) => link.peripheral.clone(),
            None => return false,
        };
        peripheral.is_connected().await.unwrap_or(false)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let (peripheral, characteristic) = {
            let guard = self.link.read().await;
            let link = guard.as_ref().ok_or(Error::NotConnected)?;
            let found = link
                .characteristics
                .get(&characteristic)
                .cloned()
                .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string()))?;
            (link.peripheral.clone(), found)
        };

        Ok(peripheral.read(&characteristic).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_transport_is_idle() {
        let transport = BleTransport::new("A4:C1:38:F0:16:49");
        assert_eq!(transport.address(), "A4:C1:38:F0:16:49");
        assert!(!transport.is_connected().await);
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_read_without_link() {
        let transport = BleTransport::new("A4:C1:38:F0:16:49");
        let err = transport
            .read(mitemp_types::uuid::TEMPERATURE_HUMIDITY)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[test]
    fn test_scan_duration_builder() {
        let transport = BleTransport::new("A4:C1:38:F0:16:49").scan_duration(Duration::from_secs(9));
        assert_eq!(transport.scan_duration, Duration::from_secs(9));
    }
}
