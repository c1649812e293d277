//! The fixed set of sensors the service reports on.
//!
//! A [`SensorRegistry`] is built once at startup and never changes shape:
//! sessions keep their configured order, which is also the order readings
//! are reported in. Connecting goes through a bounded fan-out so one
//! unreachable sensor does not hold up the others, and a background sweep
//! reconnects anything that is down.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{ConnectOutcome, SensorSession};

/// Default number of connect attempts run at the same time.
pub const DEFAULT_CONNECT_CONCURRENCY: usize = 4;

/// Default period of the reconnect sweep.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest reconnect sweep period.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Registry-wide settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum connect attempts in flight at once.
    pub connect_concurrency: usize,
    /// Period of the reconnect sweep.
    pub reconnect_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connect_concurrency: DEFAULT_CONNECT_CONCURRENCY,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect fan-out. Zero is treated as one.
    #[must_use]
    pub fn connect_concurrency(mut self, concurrency: usize) -> Self {
        self.connect_concurrency = concurrency.max(1);
        self
    }

    /// Set the reconnect sweep period, at least [`MIN_RECONNECT_INTERVAL`].
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval.max(MIN_RECONNECT_INTERVAL);
        self
    }
}

/// Per-sensor results of [`SensorRegistry::connect_all`], in registry order.
#[derive(Debug)]
pub struct ConnectReport {
    /// `(sensor name, outcome)` pairs.
    pub results: Vec<(String, Result<ConnectOutcome>)>,
}

impl ConnectReport {
    /// Sensors that are connected after the call.
    pub fn connected(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| {
                matches!(
                    r,
                    Ok(ConnectOutcome::Connected | ConnectOutcome::AlreadyConnected)
                )
            })
            .count()
    }

    /// Sensors whose connect attempt failed.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// Ordered collection of sensor sessions.
#[derive(Debug)]
pub struct SensorRegistry {
    sessions: Vec<Arc<SensorSession>>,
    config: RegistryConfig,
}

impl SensorRegistry {
    /// Build a registry. Sensor names must be unique.
    pub fn new(sessions: Vec<SensorSession>, config: RegistryConfig) -> Result<Self> {
        let mut seen = HashSet::new();
        for session in &sessions {
            if !seen.insert(session.name()) {
                return Err(Error::invalid_config(format!(
                    "duplicate sensor name '{}'",
                    session.name()
                )));
            }
        }

        Ok(Self {
            sessions: sessions.into_iter().map(Arc::new).collect(),
            config,
        })
    }

    /// Sessions in configured order.
    pub fn sessions(&self) -> &[Arc<SensorSession>] {
        &self.sessions
    }

    /// Look up a session by name.
    pub fn get(&self, name: &str) -> Option<&Arc<SensorSession>> {
        self.sessions.iter().find(|s| s.name() == name)
    }

    /// Number of sensors.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry has no sensors.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions currently `Connected`.
    pub fn connected_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_connected()).count()
    }

    /// Registry settings.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attempt to connect every session that is not connected.
    ///
    /// At most `connect_concurrency` attempts run at once. Failures are
    /// reported per sensor and never abort the others.
    pub async fn connect_all(&self) -> ConnectReport {
        let results: Vec<(String, Result<ConnectOutcome>)> =
            stream::iter(self.sessions.iter().cloned())
                .map(|session| async move {
                    let outcome = session.connect().await;
                    (session.name().to_string(), outcome)
                })
                .buffered(self.config.connect_concurrency.max(1))
                .collect()
                .await;

        let report = ConnectReport { results };
        info!(
            "Connected {}/{} sensor(s)",
            report.connected(),
            self.sessions.len()
        );
        report
    }

    /// Disconnect every session.
    pub async fn disconnect_all(&self) -> Vec<(String, Result<()>)> {
        let futures = self.sessions.iter().map(|session| async move {
            (session.name().to_string(), session.disconnect().await)
        });
        let results: Vec<(String, Result<()>)> = join_all(futures).await;

        for (name, result) in &results {
            if let Err(e) = result {
                warn!("Failed to disconnect {}: {}", name, e);
            }
        }
        results
    }

    /// Re-check every connected session's link.
    pub async fn verify_links(&self) {
        join_all(self.sessions.iter().map(|s| s.verify_link())).await;
    }

    /// Start a background task that reconnects dropped sensors.
    ///
    /// Every `reconnect_interval` the task re-checks live links and runs
    /// [`connect_all`](Self::connect_all) if anything is down. Cancelling
    /// the token stops the task, abandoning any attempt in flight.
    pub fn start_reconnect_sweep(self: &Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.config.reconnect_interval.max(MIN_RECONNECT_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; startup already connected.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!("Reconnect sweep cancelled, shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.verify_links().await;
                        let down = registry.len() - registry.connected_count();
                        if down == 0 {
                            continue;
                        }

                        debug!("Reconnect sweep: {} sensor(s) down", down);
                        tokio::select! {
                            _ = cancel_token.cancelled() => {
                                info!("Reconnect sweep cancelled, shutting down");
                                break;
                            }
                            report = registry.connect_all() => {
                                for (name, result) in &report.results {
                                    if let Err(e) = result {
                                        debug!("Reconnect sweep: {} still down: {}", name, e);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}
