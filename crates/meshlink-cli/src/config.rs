//! MeshLink CLI configuration
//!
//! Loaded from a TOML file (`--config <path>`, otherwise
//! `<config_dir>/meshlink/meshlink.toml` when it exists). Every section and
//! field is optional; command line flags are applied on top afterwards.

use std::path::{Path, PathBuf};

use meshlink_ble::BleTransportConfig;
use meshlink_core::protocol::MAX_FRAME_SIZE;
use meshlink_core::{HeartbeatConfig, ManagerConfig, Preferences, RetryConfig};
use meshlink_stream::{SerialTransportConfig, TcpTransportConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Preferred device and auto-connect
    pub preferences: Preferences,
    /// Liveness probe timing
    pub heartbeat: HeartbeatConfig,
    /// Connect step retry policy
    pub retry: RetryConfig,
    pub ble: BleTransportConfig,
    pub tcp: TcpTransportConfig,
    pub serial: SerialTransportConfig,
}

impl AppConfig {
    /// Default configuration file location, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("meshlink").join("meshlink.toml"))
    }

    /// Load from `path`, or from the default location, or fall back to defaults
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                Self::load_from_file(path)
            }
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    Self::load_from_file(path)
                }
                None => {
                    info!("Using default configuration");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(CliError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat.interval.is_zero() || self.heartbeat.timeout.is_zero() {
            return Err(CliError::Config(
                "heartbeat interval and timeout must be greater than 0".to_string(),
            ));
        }
        if self.ble.max_frame_size == 0 || self.ble.max_frame_size > MAX_FRAME_SIZE {
            return Err(CliError::Config(format!(
                "ble.max_frame_size must be between 1 and {}",
                MAX_FRAME_SIZE
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(CliError::Config(
                "serial.baud_rate must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection manager settings derived from this file
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            heartbeat: self.heartbeat.clone(),
            retry: self.retry.clone(),
            preferences: self.preferences.clone(),
            ..ManagerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::DeviceId;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.preferences.auto_connect);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [preferences]
            preferred_device = "radio-1"
            auto_connect = true

            [retry]
            max_attempts = 5

            [tcp]
            hosts = ["10.0.0.5", "radio.local:4403"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.preferences.preferred_device,
            Some(DeviceId::new("radio-1"))
        );
        assert!(config.preferences.auto_connect);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_backoff, RetryConfig::default().max_backoff);
        assert_eq!(config.tcp.hosts.len(), 2);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(60));

        let manager = config.manager_config();
        assert_eq!(manager.retry.max_attempts, 5);
        assert!(manager.preferences.auto_connect);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            AppConfig::from_toml("[retry]\nmax_attempts = 0\n"),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[ble]\nmax_frame_size = 4096\n"),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[retry]\nmax_attempts = \"three\"\n"),
            Err(CliError::TomlParsing(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("meshlink-config-{}", std::process::id()));
        let path = dir.join("meshlink.toml");

        let mut config = AppConfig::default();
        config.preferences.preferred_device = Some(DeviceId::new("radio-7"));
        config.tcp.hosts.push("10.1.2.3".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(
            loaded.preferences.preferred_device,
            Some(DeviceId::new("radio-7"))
        );
        assert_eq!(loaded.tcp.hosts, vec!["10.1.2.3".to_string()]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
