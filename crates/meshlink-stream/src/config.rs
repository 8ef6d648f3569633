//! TCP and serial transport configuration

use std::time::Duration;

/// Port the device firmware listens on for framed API clients
pub const DEFAULT_TCP_PORT: u16 = 4403;

/// Baud rate the firmware uses for the framed API over USB serial
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// ----------------------------------------------------------------------------
// TCP
// ----------------------------------------------------------------------------

/// Configuration for the TCP transport
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TcpTransportConfig {
    /// Hosts to probe, as `host` or `host:port`
    pub hosts: Vec<String>,
    /// How often discovery re-probes every host
    pub probe_interval: Duration,
    /// Connect timeout for probes and sessions
    pub connect_timeout: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            probe_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host to probe
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ----------------------------------------------------------------------------
// Serial
// ----------------------------------------------------------------------------

/// Configuration for the serial transport
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SerialTransportConfig {
    pub baud_rate: u32,
    /// How often available ports are enumerated
    pub poll_interval: Duration,
    /// Only report USB serial adapters
    pub usb_only: bool,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval: Duration::from_secs(2),
            usb_only: true,
        }
    }
}

impl SerialTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_usb_only(mut self, usb_only: bool) -> Self {
        self.usb_only = usb_only;
        self
    }
}
