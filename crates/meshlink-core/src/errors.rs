//! Error types for MeshLink
//!
//! One taxonomy is shared by transports, the handshake machinery and the
//! connection manager. Errors are `Clone` because a single failure is stored
//! as the manager's last error, broadcast to observers and delivered to every
//! waiter it cancels.

use crate::types::FirmwareVersion;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Core error type for MeshLink
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("Discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Firmware {actual} is older than the minimum supported {required}")]
    VersionMismatch {
        required: FirmwareVersion,
        actual: FirmwareVersion,
    },

    #[error("I/O failed: {reason}")]
    IoFailed { reason: String },

    #[error("Application error: {reason}")]
    AppError { reason: String },

    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Gave up after {attempts} attempts: {last_error}")]
    TooManyRetries { attempts: u32, last_error: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl From<bincode::Error> for MeshError {
    fn from(err: bincode::Error) -> Self {
        MeshError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MeshError {
    fn from(err: std::io::Error) -> Self {
        MeshError::IoFailed {
            reason: err.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl MeshError {
    pub fn discovery_failed<T: Into<String>>(reason: T) -> Self {
        MeshError::DiscoveryFailed {
            reason: reason.into(),
        }
    }

    pub fn connection_failed<T: Into<String>>(reason: T) -> Self {
        MeshError::ConnectionFailed {
            reason: reason.into(),
        }
    }

    pub fn io_failed<T: Into<String>>(reason: T) -> Self {
        MeshError::IoFailed {
            reason: reason.into(),
        }
    }

    pub fn app_error<T: Into<String>>(reason: T) -> Self {
        MeshError::AppError {
            reason: reason.into(),
        }
    }

    pub fn timeout<T: Into<String>>(operation: T) -> Self {
        MeshError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn disconnected<T: Into<String>>(reason: T) -> Self {
        MeshError::Disconnected {
            reason: reason.into(),
        }
    }

    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        MeshError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the step runner may attempt the failed step again
    pub fn is_retryable(&self) -> bool {
        match self {
            MeshError::DiscoveryFailed { .. }
            | MeshError::ConnectionFailed { .. }
            | MeshError::IoFailed { .. }
            | MeshError::Timeout { .. }
            | MeshError::Disconnected { .. } => true,
            MeshError::VersionMismatch { .. }
            | MeshError::AppError { .. }
            | MeshError::TooManyRetries { .. }
            | MeshError::Cancelled
            | MeshError::Serialization(_)
            | MeshError::Configuration { .. } => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MeshError::Cancelled)
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type MeshResult<T> = core::result::Result<T, MeshError>;
