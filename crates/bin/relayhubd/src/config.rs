//! Configuration loading — TOML file with environment variable overrides.
//!
//! Reads `relayhub.toml` from the working directory, or the file named by
//! `RELAYHUB_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use relayhub_adapter_gpio::Backend;
use relayhub_adapter_mqtt::MqttConfig;
use relayhub_domain::id::AgentId;
use serde::Deserialize;

const DEFAULT_PATH: &str = "relayhub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and file locations.
    pub agent: AgentConfig,
    /// Pin backend selection.
    pub gpio: GpioConfig,
    /// Periodic task intervals and publish timeout.
    pub timing: TimingConfig,
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Agent identity and persisted files.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Identifier used in bus topics and heartbeats.
    pub uuid: Option<AgentId>,
    /// Persisted device configuration.
    pub config_path: PathBuf,
    /// Provisioned device-number → pin table.
    pub pin_mapping_path: PathBuf,
    /// Drive every device OFF right after startup.
    pub startup_off: bool,
}

/// GPIO backend configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub backend: Backend,
    /// Root of the sysfs GPIO class, used by the `sysfs` backend.
    pub sysfs_root: PathBuf,
}

/// Intervals of the background tasks.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_interval_secs: u64,
    pub drift_interval_ms: u64,
    /// Upper bound for a single publish attempt.
    pub publish_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `relayhub.toml` (or `RELAYHUB_CONFIG`), then
    /// apply environment-variable overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, if an
    /// override cannot be parsed, or if validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("RELAYHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("RELAYHUB_AGENT_UUID") {
            let uuid = val.parse().map_err(|_| {
                ConfigError::Validation(format!("RELAYHUB_AGENT_UUID is not a UUID: {val}"))
            })?;
            self.agent.uuid = Some(uuid);
        }
        if let Ok(val) = std::env::var("RELAYHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("RELAYHUB_MQTT_PORT")
            && let Ok(port) = val.parse()
        {
            self.mqtt.broker_port = port;
        }
        if let Ok(val) = std::env::var("RELAYHUB_GPIO_BACKEND") {
            self.gpio.backend = val
                .parse()
                .map_err(|err| ConfigError::Validation(format!("{err}")))?;
        }
        if let Ok(val) = std::env::var("RELAYHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.timing.drift_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "drift_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.timing.publish_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "publish_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.mqtt.enabled {
            if self.mqtt.broker_port == 0 {
                return Err(ConfigError::Validation(
                    "broker_port must be non-zero".to_string(),
                ));
            }
            if self.agent.uuid.is_none() {
                return Err(ConfigError::Validation(
                    "agent uuid is required when MQTT is enabled".to_string(),
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.timing.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn drift_interval(&self) -> Duration {
        Duration::from_millis(self.timing.drift_interval_ms)
    }

    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.publish_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            uuid: None,
            config_path: PathBuf::from("config.json"),
            pin_mapping_path: PathBuf::from("gpio_mapping.json"),
            startup_off: true,
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Simulated,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            drift_interval_ms: 500,
            publish_timeout_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "relayhubd=info,relayhub=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
