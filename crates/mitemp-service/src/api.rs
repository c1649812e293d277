//! REST API for health checks and sensor diagnostics.
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/sensors` - Latest snapshot with connection state per sensor
//! - `GET /api/sensors/{name}` - One sensor from the latest snapshot
//!
//! Errors are returned as `{"error": "..."}` with a matching status code.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use time::OffsetDateTime;

use mitemp_types::ConnectionState;

use crate::snapshot::SensorEntry;
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sensors", get(list_sensors))
        .route("/api/sensors/{name}", get(get_sensor))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Latest snapshot, with per-sensor diagnostics.
#[derive(Debug, Serialize)]
pub struct SensorsResponse {
    /// Tick that produced the snapshot (0 before the first tick).
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
    /// Sensors connected at snapshot time.
    pub connected: usize,
    pub sensors: Vec<SensorStatus>,
}

/// One sensor's snapshot entry plus live session diagnostics.
#[derive(Debug, Serialize)]
pub struct SensorStatus {
    #[serde(flatten)]
    pub entry: SensorEntry,
    /// Polls in a row without a valid reading.
    pub consecutive_failures: u32,
    /// Most recent connect failure.
    pub last_error: Option<String>,
}

async fn sensor_status(state: &AppState, entry: &SensorEntry) -> SensorStatus {
    let (consecutive_failures, last_error) = match state.registry.get(&entry.name) {
        Some(session) => (session.consecutive_failures(), session.last_error().await),
        None => (0, None),
    };
    SensorStatus {
        entry: entry.clone(),
        consecutive_failures,
        last_error,
    }
}

/// List every sensor in the latest snapshot.
async fn list_sensors(State(state): State<Arc<AppState>>) -> Json<SensorsResponse> {
    let snapshot = state.latest();

    let mut sensors = Vec::with_capacity(snapshot.entries().len());
    for entry in snapshot.entries() {
        sensors.push(sensor_status(&state, entry).await);
    }

    Json(SensorsResponse {
        sequence: snapshot.sequence(),
        taken_at: snapshot.taken_at(),
        connected: snapshot
            .entries()
            .iter()
            .filter(|e| e.state == ConnectionState::Connected)
            .count(),
        sensors,
    })
}

/// Get one sensor from the latest snapshot.
async fn get_sensor(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SensorStatus>, AppError> {
    let snapshot = state.latest();
    let entry = snapshot
        .entries()
        .iter()
        .find(|e| e.name == name)
        .ok_or_else(|| AppError::NotFound(format!("Sensor not found: {}", name)))?;

    Ok(Json(sensor_status(&state, entry).await))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use mitemp_core::{MockTransport, RegistryConfig, SensorRegistry, SensorSession, SessionConfig};

    use crate::collector::collect_snapshot;
    use crate::config::Config;

    async fn create_test_state() -> Arc<AppState> {
        let kitchen = Arc::new(
            MockTransport::builder("A4:C1:38:F0:16:49")
                .measurement(21.3, 45)
                .build(),
        );
        let bedroom = Arc::new(
            MockTransport::builder("A4:C1:38:CE:8F:2F")
                .fail_connect()
                .build(),
        );
        let sessions = vec![
            SensorSession::with_transport("kitchen", kitchen, SessionConfig::default()),
            SensorSession::with_transport("bedroom", bedroom, SessionConfig::default()),
        ];
        let registry =
            Arc::new(SensorRegistry::new(sessions, RegistryConfig::default()).unwrap());
        registry.connect_all().await;

        let state = AppState::new(Config::default(), Arc::clone(&registry));
        state
            .snapshots
            .send_replace(Arc::new(collect_snapshot(&registry, 1).await));
        state
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state().await;
        let (status, json) = get_json(state, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_list_sensors() {
        let state = create_test_state().await;
        let (status, json) = get_json(state, "/api/sensors").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["connected"], 1);

        let sensors = json["sensors"].as_array().unwrap();
        assert_eq!(sensors.len(), 2);

        assert_eq!(sensors[0]["name"], "kitchen");
        assert_eq!(sensors[0]["state"], "connected");
        assert_eq!(sensors[0]["reading"]["status"], "valid");
        assert_eq!(sensors[0]["reading"]["humidity"], 45);
        assert_eq!(sensors[0]["consecutive_failures"], 0);

        assert_eq!(sensors[1]["name"], "bedroom");
        assert_eq!(sensors[1]["state"], "disconnected");
        assert!(sensors[1]["reading"].is_null());
        assert!(
            sensors[1]["last_error"]
                .as_str()
                .unwrap()
                .contains("A4:C1:38:CE:8F:2F")
        );
    }

    #[tokio::test]
    async fn test_get_sensor() {
        let state = create_test_state().await;
        let (status, json) = get_json(state, "/api/sensors/kitchen").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["address"], "A4:C1:38:F0:16:49");
        assert_eq!(json["reading"]["temperature"], 21.3);
    }

    #[tokio::test]
    async fn test_get_sensor_not_found() {
        let state = create_test_state().await;
        let (status, json) = get_json(state, "/api/sensors/attic").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("attic"));
    }
}
