//! Core types for MeshLink
//!
//! Newtype wrappers for device and node identity plus the [`Device`] record
//! the connection manager keeps for every radio it has seen.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::MeshError;

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// Opaque per-platform identifier assigned by the transport that found the device
///
/// BLE uses the platform peripheral id, TCP uses `host:port`, serial uses the
/// port path. Only the owning transport interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ----------------------------------------------------------------------------
// Node Number
// ----------------------------------------------------------------------------

/// Durable numeric identity of a mesh node, learned during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeNum(pub u32);

impl NodeNum {
    /// Destination used for packets addressed to every node
    pub const BROADCAST: Self = Self(u32::MAX);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for NodeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", hex::encode(self.0.to_be_bytes()))
    }
}

impl FromStr for NodeNum {
    type Err = MeshError;

    /// Accepts `!aabbccdd`, `0xaabbccdd` or a decimal number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex_part = s.strip_prefix('!').or_else(|| s.strip_prefix("0x"));
        let parsed = match hex_part {
            Some(digits) => u32::from_str_radix(digits, 16),
            None => s.parse::<u32>(),
        };
        parsed
            .map(NodeNum)
            .map_err(|_| MeshError::app_error(format!("invalid node number: {s}")))
    }
}

// ----------------------------------------------------------------------------
// Firmware Version
// ----------------------------------------------------------------------------

/// `major.minor.patch` firmware version reported in device metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl FirmwareVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for FirmwareVersion {
    type Err = MeshError;

    /// Parses the leading three numeric components; build suffixes such as
    /// `2.5.20.4c97351` or `2.6.1-beta` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MeshError::app_error(format!("invalid firmware version: {s}"));
        let mut parts = s.trim().trim_start_matches('v').split('.');
        let mut next = || -> Result<u16, MeshError> {
            let part = parts.next().ok_or_else(invalid)?;
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u16>().map_err(|_| invalid())
        };
        Ok(Self::new(next()?, next()?, next()?))
    }
}

// ----------------------------------------------------------------------------
// Transport Kind
// ----------------------------------------------------------------------------

/// The physical medium a device was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Bluetooth Low Energy
    Ble,
    /// IP socket
    Tcp,
    /// USB / UART serial line
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ble => f.write_str("ble"),
            TransportKind::Tcp => f.write_str("tcp"),
            TransportKind::Serial => f.write_str("serial"),
        }
    }
}

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// Connection state of a single device record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

/// A reachable (or previously reachable) mesh radio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Transport-assigned identity
    pub id: DeviceId,
    /// Display name advertised by the device
    pub name: String,
    /// Medium the device was found on
    pub transport: TransportKind,
    /// Last known signal strength in dBm
    pub rssi: Option<i16>,
    /// Connection state
    pub state: DeviceState,
    /// Node number, once learned through the handshake
    pub num: Option<NodeNum>,
    /// Firmware version, once learned through the handshake
    pub firmware: Option<FirmwareVersion>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            rssi: None,
            state: DeviceState::Discovered,
            num: None,
            firmware: None,
        }
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Copy the fields a discovery update is allowed to change
    ///
    /// Session-owned fields (state, node number, firmware) are left alone so a
    /// rescan never clobbers what the handshake learned.
    pub fn merge_discovery(&mut self, update: &Device) {
        self.name = update.name.clone();
        self.transport = update.transport;
        if update.rssi.is_some() {
            self.rssi = update.rssi;
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_num_parsing() {
        assert_eq!("!deadbeef".parse::<NodeNum>().unwrap(), NodeNum(0xdead_beef));
        assert_eq!("0x10".parse::<NodeNum>().unwrap(), NodeNum(16));
        assert_eq!("42".parse::<NodeNum>().unwrap(), NodeNum(42));
        assert!("!zz".parse::<NodeNum>().is_err());
    }

    #[test]
    fn test_node_num_display() {
        assert_eq!(NodeNum(0x0a0b0c0d).to_string(), "!0a0b0c0d");
        assert!(NodeNum::BROADCAST.is_broadcast());
    }

    #[test]
    fn test_firmware_version_parsing() {
        let v: FirmwareVersion = "2.5.20.4c97351".parse().unwrap();
        assert_eq!(v, FirmwareVersion::new(2, 5, 20));

        let beta: FirmwareVersion = "v2.6.1-beta".parse().unwrap();
        assert_eq!(beta, FirmwareVersion::new(2, 6, 1));

        assert!("2.5".parse::<FirmwareVersion>().is_err());
        assert!(FirmwareVersion::new(2, 7, 4) > FirmwareVersion::new(2, 7, 3));
        assert!(FirmwareVersion::new(2, 10, 0) > FirmwareVersion::new(2, 9, 9));
    }

    #[test]
    fn test_merge_discovery_keeps_session_fields() {
        let mut device = Device::new("aa", "Old", TransportKind::Ble).with_rssi(-80);
        device.state = DeviceState::Connected;
        device.num = Some(NodeNum(7));

        let update = Device::new("aa", "New", TransportKind::Ble);
        device.merge_discovery(&update);

        assert_eq!(device.name, "New");
        assert_eq!(device.rssi, Some(-80));
        assert_eq!(device.state, DeviceState::Connected);
        assert_eq!(device.num, Some(NodeNum(7)));
    }
}
