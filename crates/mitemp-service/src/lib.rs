//! Collects Xiaomi LYWSD03MMC thermometer readings and broadcasts them to
//! WebSocket clients.
//!
//! This crate provides a service that:
//! - Keeps a BLE session open to each configured sensor, reconnecting as needed
//! - Polls every sensor on a fixed cadence into one snapshot per tick
//! - Pushes each snapshot to every connected WebSocket client
//!
//! # Endpoints
//!
//! - `WS /` and `WS /api/ws` - Snapshot stream
//! - `GET /api/health` - Service health check
//! - `GET /api/sensors` - Latest snapshot with connection diagnostics
//! - `GET /api/sensors/{name}` - One sensor from the latest snapshot
//!
//! Each WebSocket message looks like:
//!
//! ```json
//! {"sensors": [
//!   {"sensor_name": "kitchen", "sensor_mac_address": "A4:C1:38:F0:16:49",
//!    "temperature": 21.3, "humidity": 45},
//!   {"sensor_name": "bedroom", "sensor_mac_address": "A4:C1:38:CE:8F:2F"}
//! ]}
//! ```
//!
//! `temperature` and `humidity` are omitted for sensors without a valid
//! reading this tick.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/mitemp/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8899"
//!
//! [collector]
//! interval = 10
//! reconnect_interval = 30
//!
//! [ble]
//! connect_timeout = 50
//! read_timeout = 10
//! connect_concurrency = 4
//!
//! [[sensors]]
//! name = "kitchen"
//! address = "A4:C1:38:F0:16:49"
//! ```

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod client;
pub mod collector;
pub mod config;
pub mod snapshot;
pub mod state;
pub mod ws;

pub use client::{ClientError, subscribe};
pub use collector::{Collector, collect_snapshot};
pub use config::{
    BleConfig, CollectorConfig, Config, ConfigError, SensorConfig, ServerConfig, ValidationError,
};
pub use snapshot::{SensorEntry, Snapshot};
pub use state::{AppState, build_registry};
pub use ws::{Termination, supervise};

/// Build the full HTTP application: REST routes, WebSocket routes and the
/// tracing and CORS layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
