//! Service configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mitemp_core::{RegistryConfig, SessionConfig, is_valid_address, normalize_address};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Collection cadence.
    pub collector: CollectorConfig,
    /// BLE timeouts and fan-out.
    pub ble: BleConfig,
    /// Sensors to report on, in reporting order.
    pub sensors: Vec<SensorConfig>,
}

impl Config {
    /// A starting configuration listing two example sensors.
    pub fn example() -> Self {
        Self {
            sensors: vec![
                SensorConfig {
                    name: "kitchen".to_string(),
                    address: "A4:C1:38:F0:16:49".to_string(),
                },
                SensorConfig {
                    name: "bedroom".to_string(),
                    address: "A4:C1:38:CE:8F:2F".to_string(),
                },
            ],
            ..Self::default()
        }
    }

    /// Load configuration from the default path, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration, collecting every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use mitemp_service::Config;
    ///
    /// let config = Config::example();
    /// config.validate().expect("Example config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.collector.validate());
        errors.extend(self.ble.validate());

        let mut seen_names = HashSet::new();
        let mut seen_addresses = HashSet::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            let prefix = format!("sensors[{}]", i);
            errors.extend(sensor.validate(&prefix));

            if !sensor.name.is_empty() && !seen_names.insert(sensor.name.as_str()) {
                errors.push(ValidationError {
                    field: format!("{}.name", prefix),
                    message: format!("duplicate sensor name '{}'", sensor.name),
                });
            }
            if !sensor.address.is_empty() && !seen_addresses.insert(normalize_address(&sensor.address)) {
                errors.push(ValidationError {
                    field: format!("{}.address", prefix),
                    message: format!("duplicate sensor address '{}'", sensor.address),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate only the `[ble]` section, for commands that talk to a single
    /// sensor and ignore the sensor list and server settings.
    pub fn validate_ble(&self) -> Result<(), ConfigError> {
        let errors = self.ble.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Registry settings derived from this configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new()
            .connect_concurrency(self.ble.connect_concurrency)
            .reconnect_interval(Duration::from_secs(self.collector.reconnect_interval))
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8899").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8899".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
            return errors;
        }

        let Some((_, port_str)) = self.bind.rsplit_once(':') else {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            });
            return errors;
        };

        match port_str.parse::<u16>() {
            Ok(0) => errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            }),
            Err(_) => errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!("invalid port '{}': must be a number 1-65535", port_str),
            }),
            Ok(_) => {}
        }

        errors
    }
}

/// Minimum collection interval in seconds.
pub const MIN_INTERVAL: u64 = 1;
/// Maximum collection interval in seconds (1 hour).
pub const MAX_INTERVAL: u64 = 3600;

/// Collection cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds between snapshots.
    pub interval: u64,
    /// Seconds between reconnect sweeps.
    pub reconnect_interval: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            reconnect_interval: 30,
        }
    }
}

impl CollectorConfig {
    /// Time between snapshots, never shorter than [`MIN_INTERVAL`] seconds.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(MIN_INTERVAL))
    }

    /// Validate collector configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval < MIN_INTERVAL {
            errors.push(ValidationError {
                field: "collector.interval".to_string(),
                message: format!(
                    "interval {} is too short (minimum {} second)",
                    self.interval, MIN_INTERVAL
                ),
            });
        } else if self.interval > MAX_INTERVAL {
            errors.push(ValidationError {
                field: "collector.interval".to_string(),
                message: format!(
                    "interval {} is too long (maximum {} seconds / 1 hour)",
                    self.interval, MAX_INTERVAL
                ),
            });
        }

        if self.reconnect_interval == 0 {
            errors.push(ValidationError {
                field: "collector.reconnect_interval".to_string(),
                message: "reconnect interval cannot be 0".to_string(),
            });
        }

        errors
    }
}

/// BLE timeouts and connect fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Connect timeout in seconds.
    pub connect_timeout: u64,
    /// Read timeout in seconds.
    pub read_timeout: u64,
    /// Connect attempts run at the same time.
    pub connect_concurrency: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 50,
            read_timeout: 10,
            connect_concurrency: 4,
        }
    }
}

impl BleConfig {
    /// Session timeouts derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .read_timeout(Duration::from_secs(self.read_timeout))
    }

    /// Validate BLE configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.connect_timeout == 0 {
            errors.push(ValidationError {
                field: "ble.connect_timeout".to_string(),
                message: "connect timeout cannot be 0".to_string(),
            });
        }
        if self.read_timeout == 0 {
            errors.push(ValidationError {
                field: "ble.read_timeout".to_string(),
                message: "read timeout cannot be 0".to_string(),
            });
        }
        if self.connect_concurrency == 0 {
            errors.push(ValidationError {
                field: "ble.connect_concurrency".to_string(),
                message: "connect concurrency must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// One sensor to report on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Label reported to clients.
    pub name: String,
    /// Hardware address, `XX:XX:XX:XX:XX:XX`.
    pub address: String,
}

impl SensorConfig {
    /// Validate sensor configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(ValidationError {
                field: format!("{}.name", prefix),
                message: "sensor name cannot be empty".to_string(),
            });
        }

        if self.address.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: "sensor address cannot be empty".to_string(),
            });
        } else if !is_valid_address(&self.address) {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: format!(
                    "invalid address '{}': expected format 'XX:XX:XX:XX:XX:XX'",
                    self.address
                ),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sensors[0].address`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mitemp")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_errors(config: &Config) -> Vec<ValidationError> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8899");
        assert_eq!(config.collector.interval, 10);
        assert_eq!(config.collector.reconnect_interval, 30);
        assert_eq!(config.ble.connect_timeout, 50);
        assert_eq!(config.ble.read_timeout, 10);
        assert_eq!(config.ble.connect_concurrency, 4);
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn test_default_and_example_validate() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::example().validate().is_ok());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9000"

            [collector]
            interval = 5

            [ble]
            connect_timeout = 20

            [[sensors]]
            name = "kitchen"
            address = "A4:C1:38:F0:16:49"

            [[sensors]]
            name = "bedroom"
            address = "A4:C1:38:CE:8F:2F"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.collector.interval, 5);
        assert_eq!(config.collector.reconnect_interval, 30);
        assert_eq!(config.ble.connect_timeout, 20);
        assert_eq!(config.ble.read_timeout, 10);
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors[1].name, "bedroom");
    }

    #[test]
    fn test_derived_core_configs() {
        let mut config = Config::default();
        config.ble.connect_timeout = 20;
        config.ble.read_timeout = 3;
        config.ble.connect_concurrency = 2;
        config.collector.reconnect_interval = 45;

        let session = config.ble.session_config();
        assert_eq!(session.connect_timeout, Duration::from_secs(20));
        assert_eq!(session.read_timeout, Duration::from_secs(3));

        let registry = config.registry_config();
        assert_eq!(registry.connect_concurrency, 2);
        assert_eq!(registry.reconnect_interval, Duration::from_secs(45));
        assert_eq!(config.collector.interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_ble_ignores_other_sections() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();
        assert!(config.validate_ble().is_ok());

        config.ble.read_timeout = 0;
        match config.validate_ble() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "ble.read_timeout");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_periods_are_clamped() {
        let mut config = Config::default();
        config.collector.interval = 0;
        config.collector.reconnect_interval = 0;

        assert_eq!(config.collector.interval(), Duration::from_secs(1));
        assert_eq!(
            config.registry_config().reconnect_interval,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let mut config = Config::example();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.save(&config_path).unwrap();

        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.sensors.len(), 2);
        assert_eq!(loaded.sensors[0].name, "kitchen");
        assert_eq!(loaded.sensors[0].address, "A4:C1:38:F0:16:49");
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/server.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("mitemp/server.toml"));
    }

    #[test]
    fn test_server_bind_validation() {
        let bind = |s: &str| ServerConfig {
            bind: s.to_string(),
        };

        assert!(bind("127.0.0.1:8899").validate().is_empty());
        assert!(bind("[::1]:8899").validate().is_empty());
        assert!(bind("localhost:8899").validate().is_empty());

        let errors = bind("").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let errors = bind("127.0.0.1").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("host:port"));

        let errors = bind("127.0.0.1:0").validate();
        assert!(errors[0].message.contains("cannot be 0"));

        let errors = bind("127.0.0.1:http").validate();
        assert!(errors[0].message.contains("must be a number"));
    }

    #[test]
    fn test_collector_validation() {
        let mut config = Config::default();
        config.collector.interval = 0;
        config.collector.reconnect_interval = 0;
        let errors = validation_errors(&config);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "collector.interval");
        assert_eq!(errors[1].field, "collector.reconnect_interval");

        config.collector.interval = 7200;
        config.collector.reconnect_interval = 30;
        let errors = validation_errors(&config);
        assert!(errors[0].message.contains("too long"));
    }

    #[test]
    fn test_ble_validation() {
        let mut config = Config::default();
        config.ble.connect_timeout = 0;
        config.ble.read_timeout = 0;
        config.ble.connect_concurrency = 0;
        let fields: Vec<String> = validation_errors(&config)
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "ble.connect_timeout",
                "ble.read_timeout",
                "ble.connect_concurrency"
            ]
        );
    }

    #[test]
    fn test_sensor_validation() {
        let sensor = |name: &str, address: &str| SensorConfig {
            name: name.to_string(),
            address: address.to_string(),
        };

        assert!(sensor("kitchen", "A4:C1:38:F0:16:49").validate("s").is_empty());

        let errors = sensor("", "A4:C1:38:F0:16:49").validate("sensors[0]");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sensors[0].name");

        let errors = sensor("kitchen", "").validate("sensors[0]");
        assert!(errors[0].message.contains("cannot be empty"));

        let errors = sensor("kitchen", "A4:C1:38").validate("sensors[0]");
        assert!(errors[0].message.contains("XX:XX:XX:XX:XX:XX"));
    }

    #[test]
    fn test_duplicate_sensors() {
        let mut config = Config::example();
        config.sensors.push(SensorConfig {
            name: "kitchen".to_string(),
            address: "a4:c1:38:f0:16:49".to_string(),
        });

        let errors = validation_errors(&config);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "sensors[2].name");
        assert!(errors[0].message.contains("duplicate sensor name"));
        assert_eq!(errors[1].field, "sensors[2].address");
        assert!(errors[1].message.contains("duplicate sensor address"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let error = ConfigError::Validation(vec![
            ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            },
            ValidationError {
                field: "sensors[0].name".to_string(),
                message: "sensor name cannot be empty".to_string(),
            },
        ]);
        let display = error.to_string();
        assert!(display.contains("  - server.bind: port cannot be 0"));
        assert!(display.contains("  - sensors[0].name: sensor name cannot be empty"));
    }
}
