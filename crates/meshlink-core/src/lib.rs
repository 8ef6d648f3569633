//! MeshLink Core
//!
//! Foundational types shared by every MeshLink crate:
//!
//! - [`types`] - device identity, node numbers, firmware versions
//! - [`errors`] - the error taxonomy used across transports and the runtime
//! - [`protocol`] - the `ToRadio`/`FromRadio` frame envelope and stream framing
//! - [`transport`] - the `Transport` and `Connection` traits each medium implements
//! - [`config`] - connection manager configuration and user preferences
//!
//! This crate performs no I/O of its own; concrete transports live in
//! `meshlink-ble` and `meshlink-stream`, orchestration in `meshlink-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod protocol;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{HeartbeatConfig, ManagerConfig, Preferences, RetryConfig};
pub use errors::{MeshError, MeshResult};
pub use protocol::{
    FrameKind, FromRadio, MeshPacket, PortNum, ToRadio, WANT_CONFIG_NONCE, WANT_DATABASE_NONCE,
};
pub use transport::{
    Connection, ConnectionEvent, ConnectionEvents, DiscoveryEvent, DiscoveryStream, Transport,
};
pub use types::{Device, DeviceId, DeviceState, FirmwareVersion, NodeNum, TransportKind};
