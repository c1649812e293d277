//! GATT transport abstraction.
//!
//! [`GattTransport`] is the seam between a [`SensorSession`](crate::SensorSession)
//! and the radio. [`BleTransport`](crate::BleTransport) drives a real adapter
//! through btleplug; [`MockTransport`](crate::MockTransport) stands in for it in
//! tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Raw connect / disconnect / read access to one BLE peripheral.
///
/// Implementations do not need to serialize calls; the session owning the
/// transport never issues two operations at once.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Hardware address of the peripheral this transport talks to.
    fn address(&self) -> &str;

    /// Establish the BLE link and discover services.
    async fn connect(&self) -> Result<()>;

    /// Release the BLE link. Must succeed when there is no link.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the radio still reports a live link.
    async fn is_connected(&self) -> bool;

    /// Read the raw value of a characteristic.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;
}
