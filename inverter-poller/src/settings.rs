//! Poller settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use pi_link::{AdapterConfig, PortConfig};
use pi_protocol::Protocol;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading the settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read
    #[error("failed to read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The settings file is not valid JSON for this schema
    #[error("failed to parse {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A value is out of range
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which protocol to speak, or detect it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProtocolChoice {
    #[default]
    Auto,
    Fixed(Protocol),
}

impl std::str::FromStr for ProtocolChoice {
    type Err = pi_protocol::UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(ProtocolChoice::Auto)
        } else {
            s.parse().map(ProtocolChoice::Fixed)
        }
    }
}

impl TryFrom<String> for ProtocolChoice {
    type Error = pi_protocol::UnknownProtocol;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProtocolChoice> for String {
    fn from(choice: ProtocolChoice) -> Self {
        match choice {
            ProtocolChoice::Auto => "auto".to_string(),
            ProtocolChoice::Fixed(protocol) => protocol.name().to_string(),
        }
    }
}

/// The inverter being polled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSettings {
    /// Serial device path
    #[serde(default = "default_device_path")]
    pub path: String,
    /// Device name shown in Home Assistant
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the serial number read from the inverter
    #[serde(default)]
    pub serial_number: Option<String>,
}

fn default_device_path() -> String {
    "/dev/hidraw0".to_string()
}

fn default_device_name() -> String {
    "Inverter".to_string()
}

fn default_manufacturer() -> String {
    "Voltronic".to_string()
}

fn default_model() -> String {
    "Unknown".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            name: default_device_name(),
            manufacturer: default_manufacturer(),
            model: default_model(),
            serial_number: None,
        }
    }
}

/// MQTT broker connection and Home Assistant discovery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Home Assistant discovery prefix
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    /// Defaults to the device id
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_server() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            server: default_server(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            discovery_prefix: default_discovery_prefix(),
            client_id: None,
        }
    }
}

/// Poller settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub protocol: ProtocolChoice,
    /// Pause between poll cycles
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    /// Reply timeout for each query
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Extra attempts after a checksum mismatch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Multiplier for published currents
    #[serde(default = "default_factor")]
    pub amperage_factor: f32,
    /// Multiplier for published powers
    #[serde(default = "default_factor")]
    pub watt_factor: f32,
    /// Also poll total generated energy (PI18)
    #[serde(default)]
    pub query_total_energy: bool,
    #[serde(default)]
    pub mqtt: MqttSettings,
}

fn default_polling_interval() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    pi_link::DEFAULT_MAX_RETRIES
}

fn default_factor() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: DeviceSettings::default(),
            protocol: ProtocolChoice::Auto,
            polling_interval_secs: default_polling_interval(),
            read_timeout_secs: default_read_timeout(),
            max_retries: default_max_retries(),
            amperage_factor: default_factor(),
            watt_factor: default_factor(),
            query_total_energy: false,
            mqtt: MqttSettings::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for the poller
    /// Uses $XDG_CONFIG_HOME/inverter-poller, falls back to ~/.config/inverter-poller
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("inverter-poller"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("inverter-poller"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`, or from the default location
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::settings_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load and validate a settings file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|e| match e {
            SettingsError::Parse { source, .. } => SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate a settings document
    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|source| SettingsError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.read_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "read_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        for (key, factor) in [
            ("amperage_factor", self.amperage_factor),
            ("watt_factor", self.watt_factor),
        ] {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("{factor} is not a positive number"),
                });
            }
        }
        Ok(())
    }

    /// Session values handed to the protocol adapter
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            max_retries: self.max_retries,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    /// Port pacing with the configured timeout and retries, for raw queries
    pub fn port_config(&self) -> PortConfig {
        let session = self.adapter_config();
        PortConfig {
            read_timeout: session.read_timeout,
            max_retries: session.max_retries,
            ..PortConfig::default()
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }
}
