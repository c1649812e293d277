//! Per-tick telemetry snapshots and their wire encoding.
//!
//! A [`Snapshot`] is built once per collection tick, wrapped in an `Arc` and
//! shared read-only by every connected client. The broadcast payload is
//! encoded when the snapshot is built, so clients never re-serialize it.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

use mitemp_types::{ConnectionState, Reading};

/// One configured sensor's state at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorEntry {
    /// Sensor name.
    pub name: String,
    /// Hardware address.
    pub address: String,
    /// Connection state after this tick's poll.
    pub state: ConnectionState,
    /// `None` when the sensor was not connected; otherwise the poll result.
    pub reading: Option<Reading>,
}

impl SensorEntry {
    /// Temperature, present only for a valid reading.
    pub fn temperature(&self) -> Option<f64> {
        self.reading
            .as_ref()
            .and_then(Reading::measurement)
            .map(|m| m.temperature)
    }

    /// Humidity, present only for a valid reading.
    pub fn humidity(&self) -> Option<u8> {
        self.reading
            .as_ref()
            .and_then(Reading::measurement)
            .map(|m| m.humidity)
    }
}

/// Immutable result of one collection tick.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sequence: u64,
    taken_at: OffsetDateTime,
    entries: Vec<SensorEntry>,
    payload: String,
}

/// Outbound message sent to WebSocket clients.
#[derive(Debug, Serialize)]
pub struct WirePayload<'a> {
    pub sensors: Vec<WireSensor<'a>>,
}

/// One sensor in the outbound message.
#[derive(Debug, Serialize)]
pub struct WireSensor<'a> {
    pub sensor_name: &'a str,
    pub sensor_mac_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<u8>,
}

impl Snapshot {
    /// Build a snapshot and encode its wire payload.
    pub fn new(sequence: u64, entries: Vec<SensorEntry>) -> Self {
        let payload = encode_payload(&entries);
        Self {
            sequence,
            taken_at: OffsetDateTime::now_utc(),
            entries,
            payload,
        }
    }

    /// Placeholder published before the first tick: every sensor listed,
    /// none with a reading.
    pub fn pending(sensors: impl IntoIterator<Item = (String, String, ConnectionState)>) -> Self {
        let entries = sensors
            .into_iter()
            .map(|(name, address, state)| SensorEntry {
                name,
                address,
                state,
                reading: None,
            })
            .collect();
        Self::new(0, entries)
    }

    /// Tick number, starting at 1. Zero marks the placeholder.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether this snapshot came from an actual collection tick.
    pub fn is_collected(&self) -> bool {
        self.sequence > 0
    }

    /// When the snapshot was built.
    pub fn taken_at(&self) -> OffsetDateTime {
        self.taken_at
    }

    /// Entries in registry order.
    pub fn entries(&self) -> &[SensorEntry] {
        &self.entries
    }

    /// Encoded wire payload.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Borrowing view of the wire payload.
    pub fn to_wire(&self) -> WirePayload<'_> {
        wire_view(&self.entries)
    }
}

fn wire_view(entries: &[SensorEntry]) -> WirePayload<'_> {
    WirePayload {
        sensors: entries
            .iter()
            .map(|entry| WireSensor {
                sensor_name: &entry.name,
                sensor_mac_address: &entry.address,
                temperature: entry.temperature(),
                humidity: entry.humidity(),
            })
            .collect(),
    }
}

fn encode_payload(entries: &[SensorEntry]) -> String {
    match serde_json::to_string(&wire_view(entries)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode snapshot: {}", e);
            r#"{"sensors":[]}"#.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mitemp_types::Measurement;
    use serde_json::{Value, json};

    fn entry(name: &str, state: ConnectionState, reading: Option<Reading>) -> SensorEntry {
        SensorEntry {
            name: name.to_string(),
            address: format!("A4:C1:38:00:00:{:02X}", name.len()),
            state,
            reading,
        }
    }

    fn valid(temperature: f64, humidity: u8) -> Option<Reading> {
        Some(Reading::Valid(Measurement {
            temperature,
            humidity,
            voltage_mv: None,
        }))
    }

    #[test]
    fn test_payload_fields_only_for_valid_readings() {
        let snapshot = Snapshot::new(
            1,
            vec![
                entry("kitchen", ConnectionState::Connected, valid(21.3, 45)),
                entry("bedroom", ConnectionState::Disconnected, None),
                entry("garage", ConnectionState::Connected, Some(Reading::Invalid)),
            ],
        );

        let json: Value = serde_json::from_str(snapshot.payload()).unwrap();
        assert_eq!(
            json,
            json!({
                "sensors": [
                    {
                        "sensor_name": "kitchen",
                        "sensor_mac_address": "A4:C1:38:00:00:07",
                        "temperature": 21.3,
                        "humidity": 45
                    },
                    {
                        "sensor_name": "bedroom",
                        "sensor_mac_address": "A4:C1:38:00:00:07"
                    },
                    {
                        "sensor_name": "garage",
                        "sensor_mac_address": "A4:C1:38:00:00:06"
                    }
                ]
            })
        );
    }

    #[test]
    fn test_payload_matches_wire_view() {
        let snapshot = Snapshot::new(
            3,
            vec![entry("kitchen", ConnectionState::Connected, valid(-2.0, 40))],
        );
        assert_eq!(
            serde_json::to_string(&snapshot.to_wire()).unwrap(),
            snapshot.payload()
        );
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::new(1, Vec::new());
        assert_eq!(snapshot.payload(), r#"{"sensors":[]}"#);
    }

    #[test]
    fn test_pending_snapshot() {
        let snapshot = Snapshot::pending(vec![(
            "kitchen".to_string(),
            "A4:C1:38:F0:16:49".to_string(),
            ConnectionState::Connecting,
        )]);
        assert!(!snapshot.is_collected());
        assert_eq!(snapshot.sequence(), 0);
        assert_eq!(snapshot.entries().len(), 1);
        assert_eq!(snapshot.entries()[0].reading, None);
        assert_eq!(snapshot.entries()[0].state, ConnectionState::Connecting);
    }

    #[test]
    fn test_entry_accessors() {
        let e = entry("kitchen", ConnectionState::Connected, valid(19.5, 60));
        assert_eq!(e.temperature(), Some(19.5));
        assert_eq!(e.humidity(), Some(60));

        let e = entry("kitchen", ConnectionState::Connected, Some(Reading::Invalid));
        assert_eq!(e.temperature(), None);
        assert_eq!(e.humidity(), None);
    }
}
