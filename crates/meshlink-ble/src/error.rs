//! Error types for BLE transport

use meshlink_core::MeshError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE transport
#[derive(Error, Debug)]
pub enum BleTransportError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Failed to initialise BLE: {0}")]
    AdapterFailed(String),

    #[error("Failed to start scan: {0}")]
    ScanFailed(String),

    #[error("Device not discovered: {device_id}")]
    DeviceNotDiscovered { device_id: String },

    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("Failed to read from characteristic: {0}")]
    ReadFailed(String),

    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("Device not connected")]
    NotConnected,
}

impl From<BleTransportError> for MeshError {
    fn from(err: BleTransportError) -> Self {
        match err {
            BleTransportError::AdapterNotAvailable
            | BleTransportError::AdapterFailed(_)
            | BleTransportError::ScanFailed(_)
            | BleTransportError::DeviceNotDiscovered { .. } => {
                MeshError::discovery_failed(err.to_string())
            }
            BleTransportError::ConnectionFailed(_)
            | BleTransportError::ServiceDiscoveryFailed(_)
            | BleTransportError::CharacteristicNotFound { .. }
            | BleTransportError::SubscriptionFailed(_) => {
                MeshError::connection_failed(err.to_string())
            }
            BleTransportError::ConnectionTimeout => MeshError::timeout("BLE connect"),
            BleTransportError::WriteFailed(_)
            | BleTransportError::ReadFailed(_)
            | BleTransportError::NotConnected => MeshError::io_failed(err.to_string()),
            BleTransportError::FrameTooLarge { .. } => MeshError::app_error(err.to_string()),
        }
    }
}
