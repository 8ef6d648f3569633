//! Wire protocol between a client and a mesh radio
//!
//! - [`frame`] - the `ToRadio`/`FromRadio` envelope and its body encoding
//! - [`codec`] - `0x94 0xC3` length framing used on serial and TCP links

pub mod codec;
pub mod frame;

pub use codec::{encode_stream_frame, DecodedItem, StreamDecoder, MAX_FRAME_SIZE, WAKE_SEQUENCE};
pub use frame::{
    generate_heartbeat_nonce, ChannelInfo, ConfigEntry, DeviceMetadata, FrameKind, FromRadio,
    LogRecord, MeshPacket, MqttProxyMessage, MyNodeInfo, NodeInfo, PortNum, QueueStatus, ToRadio,
    WANT_CONFIG_NONCE, WANT_DATABASE_NONCE,
};
