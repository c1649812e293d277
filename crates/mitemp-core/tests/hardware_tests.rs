//! Hardware integration tests for mitemp-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package mitemp-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the sensor via environment variable:
//! - `MITEMP_SENSOR`: hardware address of a LYWSD03MMC in range
//!
//! Example:
//! ```
//! MITEMP_SENSOR="A4:C1:38:F0:16:49" cargo test --package mitemp-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use mitemp_core::scan::{ScanOptions, scan_with_options};
use mitemp_core::{ConnectOutcome, SensorSession, SessionConfig};
use tokio::time::timeout;

/// Get the sensor address from the environment.
fn get_sensor() -> Option<String> {
    env::var("MITEMP_SENSOR").ok().filter(|s| !s.is_empty())
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_thermometers() {
    let options = ScanOptions::default().duration_secs(10);

    match timeout(Duration::from_secs(30), scan_with_options(options)).await {
        Ok(Ok(sensors)) => {
            println!("Scan discovered {} thermometer(s):", sensors.len());
            for sensor in &sensors {
                println!(
                    "  - {} ({}) rssi={:?}",
                    sensor.name.as_deref().unwrap_or("Unknown"),
                    sensor.identifier,
                    sensor.rssi
                );
                assert!(sensor.is_thermometer);
            }
        }
        Ok(Err(e)) => panic!("Scan failed: {}", e),
        Err(_) => panic!("Scan timed out after 30 seconds"),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_read() {
    let Some(address) = get_sensor() else {
        println!("MITEMP_SENSOR not set, skipping");
        return;
    };

    let session = SensorSession::ble("hardware", address, SessionConfig::default());
    assert_eq!(session.connect().await.unwrap(), ConnectOutcome::Connected);

    let measurement = session.read_measurement().await.unwrap();
    println!(
        "{:.2} °C, {} %, {:?} mV",
        measurement.temperature, measurement.humidity, measurement.voltage_mv
    );
    assert!((-40.0..=85.0).contains(&measurement.temperature));
    assert!(measurement.humidity <= 100);

    let battery = session.read_battery().await.unwrap();
    assert!(battery <= 100);

    session.disconnect().await.unwrap();
    assert!(!session.is_connected());
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_unknown_address_fails() {
    let config = SessionConfig::new().connect_timeout(Duration::from_secs(30));
    let session = SensorSession::ble("missing", "00:11:22:33:44:55", config);

    assert!(session.connect().await.is_err());
    assert!(!session.is_connected());
    assert!(session.last_error().await.is_some());
}
