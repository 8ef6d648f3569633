//! BLE transport configuration

use std::time::Duration;

use meshlink_core::protocol::MAX_FRAME_SIZE;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE transport
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleTransportConfig {
    /// End a scan after this long; `None` scans until the stream is dropped
    pub scan_timeout: Option<Duration>,
    /// Maximum time to wait for the link and GATT service discovery
    pub connection_timeout: Duration,
    /// Devices not re-advertised for this long are reported lost
    pub stale_after: Duration,
    /// How often RSSI is sampled on a live connection
    pub rssi_poll_interval: Duration,
    /// Largest encoded `ToRadio` frame written to the characteristic
    pub max_frame_size: usize,
    /// Only report devices whose advertised name starts with this prefix
    pub name_prefix: Option<String>,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            scan_timeout: None,
            connection_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
            rssi_poll_interval: Duration::from_secs(10),
            max_frame_size: MAX_FRAME_SIZE,
            name_prefix: None,
        }
    }
}

impl BleTransportConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = Some(timeout);
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set how long a silent device stays listed
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Set RSSI sampling interval
    pub fn with_rssi_poll_interval(mut self, interval: Duration) -> Self {
        self.rssi_poll_interval = interval;
        self
    }

    /// Set maximum frame size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set device name prefix filter
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}
