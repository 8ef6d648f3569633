//! Bluetooth Low Energy transport for MeshLink
//!
//! This crate provides a BLE transport that implements the `Transport` trait from
//! `meshlink-core`, talking to mesh radios through their GATT API service.
//!
//! ## Architecture
//!
//! - [`config`] - Transport configuration and settings
//! - [`error`] - Error types specific to BLE transport
//! - [`protocol`] - Service and characteristic UUIDs
//! - [`registry`] - Advertised peripherals and stale-device sweeping
//! - `discovery` - Adapter setup and scanning
//! - `connection` - GATT session, frame draining and RSSI sampling
//! - [`transport`] - Main transport implementation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use futures::StreamExt;
//! use meshlink_ble::{BleTransport, BleTransportConfig};
//! use meshlink_core::Transport;
//!
//! # async fn example() {
//! let transport = BleTransport::with_config(
//!     BleTransportConfig::new().with_scan_timeout(Duration::from_secs(10)),
//! );
//!
//! let mut scan = transport.discover();
//! while let Some(event) = scan.next().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```
//!
//! ## Platform Support
//!
//! Scanning and connecting go through btleplug's central mode, so Linux
//! (BlueZ), macOS and Windows are supported.

pub mod config;
mod connection;
mod discovery;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use config::BleTransportConfig;
pub use connection::BleConnection;
pub use error::BleTransportError;
pub use protocol::{
    FROM_NUM_UUID, FROM_RADIO_UUID, LOG_RADIO_UUID, MESH_SERVICE_UUID, TO_RADIO_UUID,
};
pub use registry::PeripheralRegistry;
pub use transport::BleTransport;
