//! Observable manager state and events

use core::fmt;

use meshlink_core::{Device, DeviceId, MeshError, NodeNum};
use serde::{Deserialize, Serialize};

/// Lifecycle of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionManagerState {
    Uninitialized,
    Idle,
    Discovering,
    Connecting,
    /// A connect step failed `attempt` times and is being retried
    Retrying { attempt: u32 },
    /// Zero-based index of the latest node-database entry received
    RetrievingDatabase { node_count: u32 },
    Communicating,
    Subscribed,
}

impl ConnectionManagerState {
    /// Node database is streaming in or complete
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::RetrievingDatabase { .. } | Self::Subscribed)
    }

    /// A connect sequence is underway but the database has not started
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Retrying { .. } | Self::Communicating
        )
    }
}

impl fmt::Display for ConnectionManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Idle => write!(f, "idle"),
            Self::Discovering => write!(f, "discovering"),
            Self::Connecting => write!(f, "connecting"),
            Self::Retrying { attempt } => write!(f, "retrying({})", attempt),
            Self::RetrievingDatabase { node_count } => {
                write!(f, "retrievingDatabase({})", node_count)
            }
            Self::Communicating => write!(f, "communicating"),
            Self::Subscribed => write!(f, "subscribed"),
        }
    }
}

/// Point-in-time view published after every change
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    pub state: ConnectionManagerState,
    pub devices: Vec<Device>,
    pub active_device: Option<DeviceId>,
    pub active_node_num: Option<NodeNum>,
    pub last_error: Option<MeshError>,
    pub discovering: bool,
    pub suspended: bool,
    pub frames_sent: u64,
    pub frames_received: u64,
}

impl Default for ManagerSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionManagerState::Uninitialized,
            devices: Vec::new(),
            active_device: None,
            active_node_num: None,
            last_error: None,
            discovering: false,
            suspended: false,
            frames_sent: 0,
            frames_received: 0,
        }
    }
}

impl ManagerSnapshot {
    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn active(&self) -> Option<&Device> {
        self.active_device.as_ref().and_then(|id| self.device(id))
    }
}

/// Change notifications for observers
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    StateChanged(ConnectionManagerState),
    DevicesChanged,
    ConnectionError(MeshError),
    Subscribed { device: DeviceId, node: Option<NodeNum> },
    Disconnected { device: DeviceId },
}
