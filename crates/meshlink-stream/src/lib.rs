//! Stream transports for MeshLink
//!
//! TCP and serial links carry the same byte stream: `0x94 0xC3`-framed
//! `FromRadio`/`ToRadio` bodies interleaved with the device's debug console.
//!
//! - [`config`] - transport configuration
//! - [`error`] - error types specific to these transports
//! - [`connection`] - the framed connection both transports hand out
//! - [`presence`] - poll-based discovery bookkeeping
//! - [`tcp`] / [`serial`] - the `Transport` implementations
//!
//! ```rust,no_run
//! use meshlink_stream::{TcpTransport, TcpTransportConfig};
//!
//! let transport = TcpTransport::with_config(
//!     TcpTransportConfig::new().with_host("meshtastic.local"),
//! );
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod presence;
pub mod serial;
pub mod tcp;

pub use config::{SerialTransportConfig, TcpTransportConfig, DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT};
pub use connection::StreamConnection;
pub use error::StreamTransportError;
pub use presence::PresenceTracker;
pub use serial::SerialTransport;
pub use tcp::{normalize_host, TcpTransport};
