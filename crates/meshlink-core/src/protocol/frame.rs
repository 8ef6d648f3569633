//! Frame envelope
//!
//! Every exchange with a radio is one of two messages: [`ToRadio`] from the
//! client, [`FromRadio`] from the device. The configuration handshake is
//! entirely nonce correlation: a `WantConfig` request and the
//! `ConfigComplete` that answers it carry the same nonce.

use core::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::MeshResult;
use crate::types::{FirmwareVersion, NodeNum};

// ----------------------------------------------------------------------------
// Reserved Nonces
// ----------------------------------------------------------------------------

/// Request the device configuration only (no node database)
pub const WANT_CONFIG_NONCE: u32 = 69420;

/// Request the node database only
pub const WANT_DATABASE_NONCE: u32 = 69421;

/// Pick a heartbeat nonce; zero is reserved and never produced
pub fn generate_heartbeat_nonce() -> u32 {
    rand::thread_rng().gen_range(1..=u32::MAX)
}

// ----------------------------------------------------------------------------
// Application Ports
// ----------------------------------------------------------------------------

/// Application port a mesh packet is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortNum {
    TextMessage,
    RemoteHardware,
    Position,
    NodeInfo,
    Routing,
    Admin,
    Waypoint,
    Telemetry,
    TraceRoute,
    NeighborInfo,
    Other(u32),
}

impl PortNum {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => PortNum::TextMessage,
            2 => PortNum::RemoteHardware,
            3 => PortNum::Position,
            4 => PortNum::NodeInfo,
            5 => PortNum::Routing,
            6 => PortNum::Admin,
            8 => PortNum::Waypoint,
            67 => PortNum::Telemetry,
            70 => PortNum::TraceRoute,
            71 => PortNum::NeighborInfo,
            other => PortNum::Other(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            PortNum::TextMessage => 1,
            PortNum::RemoteHardware => 2,
            PortNum::Position => 3,
            PortNum::NodeInfo => 4,
            PortNum::Routing => 5,
            PortNum::Admin => 6,
            PortNum::Waypoint => 8,
            PortNum::Telemetry => 67,
            PortNum::TraceRoute => 70,
            PortNum::NeighborInfo => 71,
            PortNum::Other(value) => *value,
        }
    }
}

// ----------------------------------------------------------------------------
// Payload Types
// ----------------------------------------------------------------------------

/// A decoded application packet travelling over the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshPacket {
    pub id: u32,
    pub from: NodeNum,
    pub to: NodeNum,
    pub channel: u8,
    pub port: PortNum,
    pub payload: Vec<u8>,
    pub want_ack: bool,
    pub hop_limit: u8,
    pub rx_rssi: Option<i16>,
}

impl MeshPacket {
    /// Build an outgoing packet with a random id and default hop limit
    pub fn new(to: NodeNum, port: PortNum, payload: Vec<u8>) -> Self {
        Self {
            id: rand::thread_rng().gen(),
            from: NodeNum(0),
            to,
            channel: 0,
            port,
            payload,
            want_ack: false,
            hop_limit: 3,
            rx_rssi: None,
        }
    }

    pub fn text(to: NodeNum, text: &str) -> Self {
        Self::new(to, PortNum::TextMessage, text.as_bytes().to_vec())
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_want_ack(mut self, want_ack: bool) -> Self {
        self.want_ack = want_ack;
        self
    }
}

/// Identity of the radio the client is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyNodeInfo {
    pub my_node_num: NodeNum,
    pub reboot_count: u32,
}

/// One entry of the device's node database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub num: NodeNum,
    pub long_name: String,
    pub short_name: String,
    pub last_heard: u32,
    pub snr: Option<f32>,
}

/// A configuration or module-configuration section, opaque to the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub section: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub index: u8,
    pub name: String,
    pub role: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub firmware_version: String,
    pub hw_model: String,
    pub has_bluetooth: bool,
    pub has_wifi: bool,
}

impl DeviceMetadata {
    pub fn parsed_firmware(&self) -> MeshResult<FirmwareVersion> {
        self.firmware_version.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: String,
    pub source: String,
    pub message: String,
}

/// Transmit queue occupancy; newer firmware also sends it as a heartbeat reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub free: u32,
    pub max: u32,
    pub mesh_packet_id: u32,
}

/// Raw MQTT payload relayed between the device and a broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttProxyMessage {
    pub topic: String,
    pub data: Vec<u8>,
    pub retained: bool,
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// Client-to-device message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToRadio {
    Packet(MeshPacket),
    WantConfig { nonce: u32 },
    Heartbeat { nonce: u32 },
    Disconnect,
    MqttProxy(MqttProxyMessage),
}

impl ToRadio {
    pub fn encode(&self) -> MeshResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> MeshResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Device-to-client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromRadio {
    Packet(MeshPacket),
    MyInfo(MyNodeInfo),
    NodeInfo(NodeInfo),
    Config(ConfigEntry),
    ModuleConfig(ConfigEntry),
    Channel(ChannelInfo),
    Metadata(DeviceMetadata),
    LogRecord(LogRecord),
    QueueStatus(QueueStatus),
    MqttProxy(MqttProxyMessage),
    Rebooted,
    ConfigComplete { nonce: u32 },
}

/// Fieldless discriminant of [`FromRadio`] used for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Packet,
    MyInfo,
    NodeInfo,
    Config,
    ModuleConfig,
    Channel,
    Metadata,
    LogRecord,
    QueueStatus,
    MqttProxy,
    Rebooted,
    ConfigComplete,
}

impl FromRadio {
    pub fn kind(&self) -> FrameKind {
        match self {
            FromRadio::Packet(_) => FrameKind::Packet,
            FromRadio::MyInfo(_) => FrameKind::MyInfo,
            FromRadio::NodeInfo(_) => FrameKind::NodeInfo,
            FromRadio::Config(_) => FrameKind::Config,
            FromRadio::ModuleConfig(_) => FrameKind::ModuleConfig,
            FromRadio::Channel(_) => FrameKind::Channel,
            FromRadio::Metadata(_) => FrameKind::Metadata,
            FromRadio::LogRecord(_) => FrameKind::LogRecord,
            FromRadio::QueueStatus(_) => FrameKind::QueueStatus,
            FromRadio::MqttProxy(_) => FrameKind::MqttProxy,
            FromRadio::Rebooted => FrameKind::Rebooted,
            FromRadio::ConfigComplete { .. } => FrameKind::ConfigComplete,
        }
    }

    pub fn encode(&self) -> MeshResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> MeshResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_numbers_match_wire_values() {
        for value in [1, 2, 3, 4, 5, 6, 8, 67, 70, 71, 256] {
            assert_eq!(PortNum::from_u32(value).as_u32(), value);
        }
        assert_eq!(PortNum::from_u32(256), PortNum::Other(256));
    }

    #[test]
    fn test_heartbeat_nonce_never_zero() {
        for _ in 0..1000 {
            assert_ne!(generate_heartbeat_nonce(), 0);
        }
    }

    #[test]
    fn test_malformed_body_is_serialization_error() {
        let err = FromRadio::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, crate::MeshError::Serialization(_)));
    }

    #[test]
    fn test_config_complete_kind() {
        let frame = FromRadio::ConfigComplete {
            nonce: WANT_DATABASE_NONCE,
        };
        assert_eq!(frame.kind(), FrameKind::ConfigComplete);
        let decoded = FromRadio::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }
}
