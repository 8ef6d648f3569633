//! Error types for the stream transports

use meshlink_core::MeshError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the TCP and serial transports
#[derive(Error, Debug)]
pub enum StreamTransportError {
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Connection to {address} timed out")]
    ConnectTimeout { address: String },

    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed { port: String, reason: String },

    #[error("Failed to list serial ports: {0}")]
    PortEnumerationFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to write to stream: {0}")]
    WriteFailed(String),

    #[error("Stream closed")]
    Closed,
}

impl From<StreamTransportError> for MeshError {
    fn from(err: StreamTransportError) -> Self {
        match err {
            StreamTransportError::ConnectFailed { .. }
            | StreamTransportError::PortOpenFailed { .. } => {
                MeshError::connection_failed(err.to_string())
            }
            StreamTransportError::ConnectTimeout { address } => {
                MeshError::timeout(format!("connect to {}", address))
            }
            StreamTransportError::PortEnumerationFailed(_) => {
                MeshError::discovery_failed(err.to_string())
            }
            StreamTransportError::InvalidAddress(_) => MeshError::config_error(err.to_string()),
            StreamTransportError::WriteFailed(_) | StreamTransportError::Closed => {
                MeshError::io_failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_keeps_retry_classification() {
        let timeout: MeshError = StreamTransportError::ConnectTimeout {
            address: "10.0.0.1:4403".into(),
        }
        .into();
        assert!(timeout.is_retryable());

        let invalid: MeshError = StreamTransportError::InvalidAddress("::::".into()).into();
        assert!(!invalid.is_retryable());
    }
}
