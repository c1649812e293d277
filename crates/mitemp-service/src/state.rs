//! Application state shared across handlers and background tasks.
//!
//! # Snapshot fan-out
//!
//! The collector publishes each [`Snapshot`] on a `watch` channel. Every
//! WebSocket client holds its own receiver and only ever sees the latest
//! value: a slow client skips ticks instead of queueing them, and the
//! collector never waits on any client.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use mitemp_core::{SensorRegistry, SensorSession};

use crate::config::Config;
use crate::snapshot::Snapshot;

/// Shared application state.
pub struct AppState {
    /// Configuration the service was started with.
    pub config: Config,
    /// The configured sensors.
    pub registry: Arc<SensorRegistry>,
    /// Latest snapshot; replaced by the collector every tick.
    pub snapshots: watch::Sender<Arc<Snapshot>>,
    /// Cancelled once at shutdown; every background task and client
    /// supervisor listens on a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state around an existing registry.
    pub fn new(config: Config, registry: Arc<SensorRegistry>) -> Arc<Self> {
        let pending = Snapshot::pending(registry.sessions().iter().map(|session| {
            (
                session.name().to_string(),
                session.address().to_string(),
                session.state(),
            )
        }));
        let (snapshots, _) = watch::channel(Arc::new(pending));

        Arc::new(Self {
            config,
            registry,
            snapshots,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots.borrow())
    }
}

/// Build the sensor registry described by `config`, one BLE session per
/// configured sensor.
pub fn build_registry(config: &Config) -> mitemp_core::Result<SensorRegistry> {
    let session_config = config.ble.session_config();
    let sessions = config
        .sensors
        .iter()
        .map(|sensor| {
            SensorSession::ble(
                sensor.name.clone(),
                sensor.address.clone(),
                session_config.clone(),
            )
        })
        .collect();
    SensorRegistry::new(sessions, config.registry_config())
}
