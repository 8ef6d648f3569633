//! MeshLink Harness
//!
//! Test support for code built on MeshLink:
//!
//! - [`radio`]: a scripted device that answers requests like real firmware
//! - [`mock_transport`]: an in-memory transport backed by that script
//!   (requires the `testing` feature)

pub mod radio;

#[cfg(feature = "testing")]
pub mod mock_transport;

pub use radio::{node_info, RadioResponse, RadioScript};

#[cfg(feature = "testing")]
pub use mock_transport::{DisconnectRecord, MockConnection, MockTransport};
