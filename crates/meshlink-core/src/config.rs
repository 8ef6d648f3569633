//! Connection manager configuration
//!
//! Everything the runtime reads from outside: liveness timing, retry policy,
//! firmware requirements and the two user preferences that drive
//! auto-connect.

use core::time::Duration;

use crate::types::{DeviceId, FirmwareVersion};

// ----------------------------------------------------------------------------
// Heartbeat Configuration
// ----------------------------------------------------------------------------

/// Liveness probe timing
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Idle period after the last received data before a probe is sent
    pub interval: Duration,
    /// How long to wait for any data after a probe before declaring the link dead
    pub timeout: Duration,
    /// Oldest firmware that answers heartbeats; older peers never arm the timeout
    pub ack_min_firmware: FirmwareVersion,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
            ack_min_firmware: FirmwareVersion::new(2, 7, 4),
        }
    }
}

impl HeartbeatConfig {
    /// Whether a device running `firmware` acknowledges heartbeats
    pub fn supports_ack(&self, firmware: Option<FirmwareVersion>) -> bool {
        firmware.is_some_and(|v| v >= self.ack_min_firmware)
    }
}

// ----------------------------------------------------------------------------
// Retry Configuration
// ----------------------------------------------------------------------------

/// Per-step retry policy for the connect sequence
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per step, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub backoff: Duration,
    /// Growth factor applied per further retry
    pub backoff_multiplier: u32,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            backoff_multiplier: 2,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// No delay between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
            backoff_multiplier: 1,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1)
            .saturating_pow(retry.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

// ----------------------------------------------------------------------------
// Preferences
// ----------------------------------------------------------------------------

/// User preferences consumed by discovery
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Device to connect to automatically when it shows up
    pub preferred_device: Option<DeviceId>,
    /// Whether discovery may trigger a connect to the preferred device
    pub auto_connect: bool,
}

// ----------------------------------------------------------------------------
// Manager Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the connection manager
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub heartbeat: HeartbeatConfig,
    pub retry: RetryConfig,
    pub preferences: Preferences,
    /// Oldest firmware the handshake accepts
    pub min_firmware: FirmwareVersion,
    /// Capacity of the observer broadcast channel
    pub event_buffer_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            retry: RetryConfig::default(),
            preferences: Preferences::default(),
            min_firmware: FirmwareVersion::new(2, 3, 0),
            event_buffer_size: 256,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_preferred_device(mut self, device: impl Into<DeviceId>) -> Self {
        self.preferences.preferred_device = Some(device.into());
        self
    }

    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.preferences.auto_connect = enabled;
        self
    }

    pub fn with_min_firmware(mut self, version: FirmwareVersion) -> Self {
        self.min_firmware = version;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}
