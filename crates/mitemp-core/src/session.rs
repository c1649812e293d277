//! Per-sensor connection lifecycle and reads.
//!
//! A [`SensorSession`] owns one [`GattTransport`] and is the only thing that
//! talks to it. State lives in an atomic so [`SensorSession::is_connected`]
//! never waits on the radio; operations that do touch the radio take an
//! internal lock, so a session never has two GATT operations in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mitemp_types::uuid::{BATTERY_LEVEL, TEMPERATURE_HUMIDITY};
use mitemp_types::{ConnectionState, Measurement, Reading};

use crate::ble::BleTransport;
use crate::error::{Error, Result};
use crate::transport::GattTransport;

/// Default timeout for establishing a link.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(50);

/// Default timeout for a single characteristic read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts applied by a [`SensorSession`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mitemp_core::SessionConfig;
///
/// let config = SessionConfig::new()
///     .connect_timeout(Duration::from_secs(20))
///     .read_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for establishing a link.
    pub connect_timeout: Duration,
    /// Timeout for a single characteristic read.
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// What a successful [`SensorSession::connect`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// This call established the link.
    Connected,
    /// The session was already connected; nothing was done.
    AlreadyConnected,
    /// Another connect attempt is running; this call did not start one.
    InProgress,
}

/// Resets a `Connecting` session if the connect future is dropped midway,
/// and tears down whatever link the abandoned attempt brought up.
struct ConnectingGuard<'a> {
    state: &'a Arc<AtomicU8>,
    op_lock: &'a Arc<Mutex<()>>,
    transport: &'a Arc<dyn GattTransport>,
    armed: bool,
}

impl ConnectingGuard<'_> {
    fn finish(mut self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);

            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let state = Arc::clone(self.state);
                let op_lock = Arc::clone(self.op_lock);
                let transport = Arc::clone(self.transport);
                handle.spawn(async move {
                    let _op = op_lock.lock().await;
                    // A newer connect may already own the link.
                    if state.load(Ordering::SeqCst) != ConnectionState::Disconnected as u8 {
                        return;
                    }
                    if let Err(e) = transport.disconnect().await {
                        debug!("Cleanup after abandoned connect failed: {}", e);
                    }
                });
            }
        }
    }
}

/// One physical thermometer.
pub struct SensorSession {
    name: String,
    address: String,
    transport: Arc<dyn GattTransport>,
    config: SessionConfig,
    state: Arc<AtomicU8>,
    op_lock: Arc<Mutex<()>>,
    last_error: RwLock<Option<String>>,
    consecutive_failures: AtomicU32,
}

impl fmt::Debug for SensorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorSession")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SensorSession {
    /// Create a session backed by a real BLE link.
    pub fn ble(name: impl Into<String>, address: impl Into<String>, config: SessionConfig) -> Self {
        Self::with_transport(name, Arc::new(BleTransport::new(address)), config)
    }

    /// Create a session over any transport.
    pub fn with_transport(
        name: impl Into<String>,
        transport: Arc<dyn GattTransport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            address: transport.address().to_string(),
            transport,
            config,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected as u8)),
            op_lock: Arc::new(Mutex::new(())),
            last_error: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Sensor name, unique within a registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Timeouts in effect.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Whether the session is `Connected`. Never blocks.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Message of the most recent connect failure, cleared on success.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Number of polls in a row that produced no valid reading.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Establish the link.
    ///
    /// Only one connect attempt runs at a time: a caller that finds the
    /// session `Connecting` gets [`ConnectOutcome::InProgress`] instead of
    /// starting a second one. On failure or timeout the session is
    /// `Disconnected` again and the error is kept for [`last_error`](Self::last_error).
    #[tracing::instrument(level = "info", skip(self), fields(sensor = %self.name, address = %self.address))]
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        if let Err(current) = self.state.compare_exchange(
            ConnectionState::Disconnected as u8,
            ConnectionState::Connecting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Ok(match ConnectionState::from(current) {
                ConnectionState::Connected => ConnectOutcome::AlreadyConnected,
                _ => ConnectOutcome::InProgress,
            });
        }
        let guard = ConnectingGuard {
            state: &self.state,
            op_lock: &self.op_lock,
            transport: &self.transport,
            armed: true,
        };

        let _op = self.op_lock.lock().await;
        info!("Connecting to sensor...");

        let connect_timeout = self.config.connect_timeout;
        let result = match timeout(connect_timeout, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("connect", connect_timeout)),
        };

        match result {
            Ok(()) => {
                guard.finish(ConnectionState::Connected);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                *self.last_error.write().await = None;
                info!("Sensor connected");
                Ok(ConnectOutcome::Connected)
            }
            Err(e) => {
                // Tear down whatever half-open link the attempt left behind.
                if let Err(cleanup) = self.transport.disconnect().await {
                    debug!("Cleanup after failed connect failed: {}", cleanup);
                }
                guard.finish(ConnectionState::Disconnected);
                warn!("Failed to connect: {}", e);
                *self.last_error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Release the link.
    ///
    /// The transport is always asked to tear down, even for a session that
    /// is already `Disconnected`, so a half-open link from a failed attempt
    /// does not outlive the session. The session ends up `Disconnected` even
    /// if the transport reports an error.
    #[tracing::instrument(level = "info", skip(self), fields(sensor = %self.name))]
    pub async fn disconnect(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        if self.state() == ConnectionState::Disconnected {
            debug!("Session already disconnected, releasing transport");
        } else {
            info!("Disconnecting from sensor...");
        }

        let result = self.transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
        result
    }

    /// Re-check the radio for a `Connected` session and mark it
    /// `Disconnected` if the link is gone. Returns whether it is still up.
    pub async fn verify_link(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        let _op = self.op_lock.lock().await;
        if !self.is_connected() {
            return false;
        }
        if self.link_alive().await {
            return true;
        }
        warn!(sensor = %self.name, "Sensor link lost");
        self.set_state(ConnectionState::Disconnected);
        false
    }

    async fn link_alive(&self) -> bool {
        timeout(self.config.read_timeout, self.transport.is_connected())
            .await
            .unwrap_or(false)
    }

    /// Read the raw value of a characteristic.
    ///
    /// Fails with [`Error::NotConnected`] unless the session is `Connected`.
    /// A failure that turns out to be a dropped link also moves the session
    /// to `Disconnected`.
    pub async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let _op = self.op_lock.lock().await;
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let read_timeout = self.config.read_timeout;
        let result = match timeout(read_timeout, self.transport.read(characteristic)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("read characteristic {}", characteristic),
                read_timeout,
            )),
        };

        if let Err(e) = &result {
            debug!(sensor = %self.name, %characteristic, "Read failed: {}", e);
            if !self.link_alive().await {
                warn!(sensor = %self.name, "Sensor link lost");
                self.set_state(ConnectionState::Disconnected);
            }
        }
        result
    }

    /// Read and decode temperature and humidity in one GATT read.
    pub async fn read_measurement(&self) -> Result<Measurement> {
        let bytes = self.read_characteristic(TEMPERATURE_HUMIDITY).await?;
        Ok(Measurement::from_bytes(&bytes)?)
    }

    /// Temperature in °C, or `None` when it cannot be read.
    pub async fn get_temperature(&self) -> Option<f64> {
        match self.read_measurement().await {
            Ok(m) => Some(m.temperature),
            Err(e) => {
                debug!(sensor = %self.name, "Temperature unavailable: {}", e);
                None
            }
        }
    }

    /// Relative humidity in %, or `None` when it cannot be read.
    pub async fn get_humidity(&self) -> Option<u8> {
        match self.read_measurement().await {
            Ok(m) => Some(m.humidity),
            Err(e) => {
                debug!(sensor = %self.name, "Humidity unavailable: {}", e);
                None
            }
        }
    }

    /// Battery level in %.
    pub async fn read_battery(&self) -> Result<u8> {
        let bytes = self.read_characteristic(BATTERY_LEVEL).await?;
        bytes
            .first()
            .copied()
            .ok_or(Error::InvalidReadingFormat {
                expected: 1,
                actual: 0,
            })
    }

    /// Sample the sensor for one collection cycle.
    ///
    /// Returns `None` when the session is not connected, otherwise a valid
    /// or invalid [`Reading`]. Failures are logged at `warn` on the first
    /// occurrence and every tenth one after that.
    pub async fn poll(&self) -> Option<Reading> {
        if !self.is_connected() {
            return None;
        }

        match self.read_measurement().await {
            Ok(measurement) => {
                let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
                if previous > 0 {
                    info!(sensor = %self.name, "Readings recovered after {} failure(s)", previous);
                }
                Some(Reading::Valid(measurement))
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == 1 || failures % 10 == 0 {
                    warn!(
                        sensor = %self.name,
                        failures,
                        "Failed to read sensor: {}", e
                    );
                } else {
                    debug!(sensor = %self.name, failures, "Failed to read sensor: {}", e);
                }
                Some(Reading::Invalid)
            }
        }
    }
}
