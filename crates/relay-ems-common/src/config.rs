//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;
use crate::settings::{ConnectionSettings, DEFAULT_HOST, DEFAULT_PORT};

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

fn default_state_directory() -> PathBuf {
    PathBuf::from("target/state")
}

/// Primary configuration object for the relay-ems runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RELAY_EMS_CONFIG";

    /// Load configuration from disk, respecting the `RELAY_EMS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Retrieve a device configuration by identifier.
    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.get(device_id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(anyhow!("configuration must contain at least one device"));
        }
        for (device_id, device) in &self.devices {
            device.validate(device_id)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// One polled device.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl DeviceConfig {
    pub fn validate(&self, device_id: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("device '{}' must declare a host", device_id));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!(
                "device '{}' must use a non-zero poll_interval",
                device_id
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

/// Where discovered field sets and command catalogs are kept between restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_directory")]
    pub directory: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            directory: default_state_directory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[devices.plug]
host = "192.168.1.40"
user = "admin"
password = "joker"
poll_interval = 30

[devices.heater]
host = "heater.local"
port = 8080

[logging]
format = "pretty"

[metrics]
enabled = false
"#;

    #[test]
    fn parses_devices_in_declaration_order() {
        let config: AppConfig = SAMPLE.parse().unwrap();
        let ids: Vec<&str> = config.devices.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["plug", "heater"]);

        let plug = config.device("plug").unwrap();
        assert_eq!(plug.poll_interval, Duration::from_secs(30));
        assert_eq!(plug.request_timeout, Duration::from_secs(10));
        assert_eq!(plug.settings().user(), Some("admin"));

        let heater = config.device("heater").unwrap();
        assert_eq!(heater.port, 8080);
        assert_eq!(heater.poll_interval, Duration::from_secs(60));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn rejects_empty_device_list() {
        let err = "[logging]\nformat = \"pretty\"\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("at least one device"));
    }

    #[test]
    fn rejects_blank_host() {
        let err = "[devices.plug]\nhost = \"  \"\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("must declare a host"));
    }

    #[test]
    fn loads_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-ems.toml");
        fs::write(&path, SAMPLE).unwrap();
        let missing = dir.path().join("missing.toml");

        let loaded = AppConfig::load_with_source(&[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.devices.len(), 2);
    }
}
