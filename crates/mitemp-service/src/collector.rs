//! Background telemetry collector.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use mitemp_core::SensorRegistry;

use crate::snapshot::{SensorEntry, Snapshot};
use crate::state::AppState;

/// Polls every sensor on a fixed cadence and publishes one snapshot per tick.
pub struct Collector {
    state: Arc<AppState>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start collecting in the background.
    ///
    /// The first snapshot is taken immediately, then every
    /// `collector.interval` seconds until the state's shutdown token is
    /// cancelled.
    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let period = state.config.collector.interval();
        let cancel_token = state.shutdown.child_token();

        info!(
            "Starting collector for {} sensor(s) (interval: {}s)",
            state.registry.len(),
            period.as_secs()
        );

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sequence = 0u64;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!("Collector cancelled, shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        sequence += 1;
                        let snapshot = collect_snapshot(&state.registry, sequence).await;
                        debug!(
                            sequence,
                            receivers = state.snapshots.receiver_count(),
                            "Publishing snapshot"
                        );
                        state.snapshots.send_replace(Arc::new(snapshot));
                    }
                }
            }
        })
    }
}

/// Poll every sensor concurrently and assemble a snapshot in registry order.
///
/// Never fails: a sensor that is not connected gets an entry without a
/// reading, and a failed read gets an invalid one.
pub async fn collect_snapshot(registry: &SensorRegistry, sequence: u64) -> Snapshot {
    let sessions = registry.sessions();
    let readings = join_all(sessions.iter().map(|session| session.poll())).await;

    let entries: Vec<SensorEntry> = sessions
        .iter()
        .zip(readings)
        .map(|(session, reading)| SensorEntry {
            name: session.name().to_string(),
            address: session.address().to_string(),
            state: session.state(),
            reading,
        })
        .collect();

    let valid = entries
        .iter()
        .filter(|e| e.reading.is_some_and(|r| r.is_valid()))
        .count();
    debug!(
        sequence,
        "Collected {}/{} valid reading(s)",
        valid,
        entries.len()
    );

    Snapshot::new(sequence, entries)
}
