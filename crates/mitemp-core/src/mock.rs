//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`GattTransport`] without a radio, so sessions,
//! the registry and the collector can be exercised in unit tests.
//!
//! # Features
//!
//! - **Failure injection**: fail connects or reads, always or a fixed number of times
//! - **Latency simulation**: delay connects and reads to exercise timeouts
//! - **Link loss**: drop the link as if the sensor went out of range

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use mitemp_types::uuid::{BATTERY_LEVEL, TEMPERATURE_HUMIDITY};

use crate::error::{Error, Result};
use crate::transport::GattTransport;

/// A fake thermometer link.
///
/// # Example
///
/// ```
/// use mitemp_core::{GattTransport, MockTransport};
/// use mitemp_types::uuid::TEMPERATURE_HUMIDITY;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::builder("A4:C1:38:F0:16:49")
///         .measurement(21.3, 45)
///         .build();
///     transport.connect().await.unwrap();
///     let raw = transport.read(TEMPERATURE_HUMIDITY).await.unwrap();
///     assert_eq!(raw[2], 45);
/// }
/// ```
pub struct MockTransport {
    address: String,
    connected: AtomicBool,
    payloads: RwLock<HashMap<Uuid, Vec<u8>>>,
    fail_connect: AtomicBool,
    /// A failing connect still brings the radio link up.
    half_open_on_fail: AtomicBool,
    fail_read: AtomicBool,
    fail_message: RwLock<String>,
    /// Reads to fail before succeeding again.
    remaining_read_failures: AtomicU32,
    /// Read that turns the link off when reached (0 = never).
    drop_link_on_read: AtomicU32,
    connect_latency_ms: AtomicU64,
    read_latency_ms: AtomicU64,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
    read_count: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("address", &self.address)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

/// Encode a measurement the way the thermometer does.
pub fn encode_measurement(temperature: f64, humidity: u8, voltage_mv: u16) -> Vec<u8> {
    let centi = (temperature * 100.0).round() as i16;
    let mut bytes = Vec::with_capacity(5);
    bytes.extend_from_slice(&centi.to_le_bytes());
    bytes.push(humidity);
    bytes.extend_from_slice(&voltage_mv.to_le_bytes());
    bytes
}

impl MockTransport {
    /// Create a disconnected mock reporting 22.5 °C, 50 % and 85 % battery.
    pub fn new(address: impl Into<String>) -> Self {
        let mut payloads = HashMap::new();
        payloads.insert(TEMPERATURE_HUMIDITY, encode_measurement(22.5, 50, 2950));
        payloads.insert(BATTERY_LEVEL, vec![85]);

        Self {
            address: address.into(),
            connected: AtomicBool::new(false),
            payloads: RwLock::new(payloads),
            fail_connect: AtomicBool::new(false),
            half_open_on_fail: AtomicBool::new(false),
            fail_read: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            remaining_read_failures: AtomicU32::new(0),
            drop_link_on_read: AtomicU32::new(0),
            connect_latency_ms: AtomicU64::new(0),
            read_latency_ms: AtomicU64::new(0),
            connect_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
            read_count: AtomicU32::new(0),
        }
    }

    /// Start building a mock for `address`.
    pub fn builder(address: impl Into<String>) -> MockTransportBuilder {
        MockTransportBuilder::new(address)
    }

    /// Replace the temperature/humidity payload.
    pub async fn set_measurement(&self, temperature: f64, humidity: u8) {
        self.set_payload(TEMPERATURE_HUMIDITY, encode_measurement(temperature, humidity, 2950))
            .await;
    }

    /// Replace the raw payload of a characteristic.
    pub async fn set_payload(&self, characteristic: Uuid, bytes: Vec<u8>) {
        self.payloads.write().await.insert(characteristic, bytes);
    }

    /// Make every connect attempt fail (or succeed again).
    pub fn set_connect_fails(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Leave the link up when a connect attempt fails, like a peripheral
    /// that connects but then fails service discovery.
    pub fn set_connect_leaves_link(&self, leave: bool) {
        self.half_open_on_fail.store(leave, Ordering::Relaxed);
    }

    /// Make every read fail with `message` (or succeed again).
    pub async fn set_read_fails(&self, fail: bool, message: Option<&str>) {
        self.fail_read.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Fail the next `count` reads, then succeed.
    pub fn set_transient_read_failures(&self, count: u32) {
        self.remaining_read_failures.store(count, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated read latency.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Lose the link immediately, as if the sensor went out of range.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Lose the link when the `nth` read (1-based, counted from now) is attempted.
    pub fn drop_link_after_reads(&self, nth: u32) {
        let base = self.read_count.load(Ordering::Relaxed);
        self.drop_link_on_read.store(base + nth, Ordering::Relaxed);
    }

    /// Number of connect attempts made.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Number of disconnect calls made.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    /// Number of read attempts made.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    async fn simulate_latency(latency_ms: &AtomicU64) {
        let latency = latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }
}

#[async_trait]
impl GattTransport for MockTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        Self::simulate_latency(&self.connect_latency_ms).await;

        if self.fail_connect.load(Ordering::Relaxed) {
            if self.half_open_on_fail.load(Ordering::Relaxed) {
                self.connected.store(true, Ordering::Relaxed);
            }
            return Err(Error::device_not_found(self.address.clone()));
        }
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_count.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let count = self.read_count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.drop_link_on_read.load(Ordering::Relaxed) == count {
            self.connected.store(false, Ordering::Relaxed);
        }

        if !self.connected.load(Ordering::Relaxed) {
            return Err(Error::NotConnected);
        }

        Self::simulate_latency(&self.read_latency_ms).await;

        if self.remaining_read_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_read_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::InvalidData(self.fail_message.read().await.clone()));
        }
        if self.fail_read.load(Ordering::Relaxed) {
            return Err(Error::InvalidData(self.fail_message.read().await.clone()));
        }

        self.payloads
            .read()
            .await
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string()))
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportBuilder {
    address: String,
    measurement: Option<(f64, u8)>,
    battery: Option<u8>,
    connected: bool,
    fail_connect: bool,
    connect_latency: Duration,
    read_latency: Duration,
}

impl MockTransportBuilder {
    /// Create a builder for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            measurement: None,
            battery: None,
            connected: false,
            fail_connect: false,
            connect_latency: Duration::ZERO,
            read_latency: Duration::ZERO,
        }
    }

    /// Temperature (°C) and humidity (%) to report.
    pub fn measurement(mut self, temperature: f64, humidity: u8) -> Self {
        self.measurement = Some((temperature, humidity));
        self
    }

    /// Battery level (%) to report.
    pub fn battery(mut self, battery: u8) -> Self {
        self.battery = Some(battery);
        self
    }

    /// Start with the link already up.
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Make every connect attempt fail.
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Simulated connect latency.
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Simulated read latency.
    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Build the mock.
    pub fn build(self) -> MockTransport {
        let mut transport = MockTransport::new(self.address);
        {
            // Nothing else holds the locks yet.
            let payloads = transport.payloads.get_mut();
            if let Some((temperature, humidity)) = self.measurement {
                payloads.insert(
                    TEMPERATURE_HUMIDITY,
                    encode_measurement(temperature, humidity, 2950),
                );
            }
            if let Some(battery) = self.battery {
                payloads.insert(BATTERY_LEVEL, vec![battery]);
            }
        }
        transport.connected.store(self.connected, Ordering::Relaxed);
        transport
            .fail_connect
            .store(self.fail_connect, Ordering::Relaxed);
        transport.set_connect_latency(self.connect_latency);
        transport.set_read_latency(self.read_latency);
        transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mitemp_types::Measurement;

    #[test]
    fn test_encode_measurement() {
        assert_eq!(
            encode_measurement(21.3, 45, 2950),
            vec![0x52, 0x08, 0x2D, 0x86, 0x0B]
        );
        let m = Measurement::from_bytes(&encode_measurement(-5.25, 80, 3000)).unwrap();
        assert!((m.temperature - -5.25).abs() < 0.001);
        assert_eq!(m.humidity, 80);
    }

    #[tokio::test]
    async fn test_mock_connect_and_read() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .measurement(21.3, 45)
            .battery(77)
            .build();
        assert!(!transport.is_connected().await);

        transport.connect().await.unwrap();
        assert!(transport.is_connected().await);

        let raw = transport.read(TEMPERATURE_HUMIDITY).await.unwrap();
        assert_eq!(raw, vec![0x52, 0x08, 0x2D, 0x86, 0x0B]);
        assert_eq!(transport.read(BATTERY_LEVEL).await.unwrap(), vec![77]);
        assert_eq!(transport.read_count(), 2);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_mock_not_connected() {
        let transport = MockTransport::new("A4:C1:38:F0:16:49");
        let result = transport.read(TEMPERATURE_HUMIDITY).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_mock_connect_failure() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .fail_connect()
            .build();
        assert!(matches!(
            transport.connect().await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(!transport.is_connected().await);
        assert_eq!(transport.connect_count(), 1);

        transport.set_connect_fails(false);
        transport.connect().await.unwrap();
        assert!(transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_mock_failed_connect_can_leave_link_up() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .fail_connect()
            .build();
        transport.set_connect_leaves_link(true);

        assert!(transport.connect().await.is_err());
        assert!(transport.is_connected().await);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected().await);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_read_failure() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .connected(true)
            .build();
        transport.set_read_fails(true, Some("GATT error")).await;

        let err = transport.read(TEMPERATURE_HUMIDITY).await.unwrap_err();
        assert!(err.to_string().contains("GATT error"));
    }

    #[tokio::test]
    async fn test_mock_transient_failures() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .connected(true)
            .build();
        transport.set_transient_read_failures(2);

        assert!(transport.read(TEMPERATURE_HUMIDITY).await.is_err());
        assert!(transport.read(TEMPERATURE_HUMIDITY).await.is_err());
        assert!(transport.read(TEMPERATURE_HUMIDITY).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_drop_link_after_reads() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .connected(true)
            .build();
        transport.drop_link_after_reads(2);

        assert!(transport.read(TEMPERATURE_HUMIDITY).await.is_ok());
        assert!(matches!(
            transport.read(TEMPERATURE_HUMIDITY).await,
            Err(Error::NotConnected)
        ));
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_mock_unknown_characteristic() {
        let transport = MockTransport::builder("A4:C1:38:F0:16:49")
            .connected(true)
            .build();
        let result = transport.read(Uuid::nil()).await;
        assert!(matches!(result, Err(Error::CharacteristicNotFound { .. })));
    }
}
