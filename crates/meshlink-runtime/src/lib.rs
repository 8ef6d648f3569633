//! MeshLink Runtime
//!
//! The orchestration engine that turns a set of transports into one managed
//! connection to a mesh radio:
//!
//! - [`ConnectionManager`]: the single owner of connection state, driven as
//!   an actor task and built with [`ConnectionManagerBuilder`]
//! - [`SequentialStepRunner`]: retrying, cancellable connect sequence
//! - [`HandshakeCoordinator`], [`OneShotSlot`], [`Gate`]: nonce-correlated
//!   configuration and node-database handshake
//! - [`HeartbeatMonitor`], [`ResettableTimer`]: liveness detection
//! - [`DiscoveryAggregator`], [`DeviceList`]: merged discovery across transports
//! - [`PacketDispatcher`]: hands application frames to registered handlers
//!
//! `meshlink-core` defines the data model and transport traits this crate
//! drives.

pub mod builder;
pub mod devices;
pub mod discovery;
pub mod dispatch;
pub mod handshake;
pub mod heartbeat;
pub mod manager;
pub mod step_runner;
pub mod timer;
pub mod waiter;

pub use builder::ConnectionManagerBuilder;
pub use devices::DeviceList;
pub use discovery::DiscoveryAggregator;
pub use dispatch::{FrameHandler, PacketDispatcher};
pub use handshake::{HandshakeCoordinator, HandshakeSignal};
pub use heartbeat::{HeartbeatMonitor, HeartbeatSignal};
pub use manager::{ConnectionManager, ConnectionManagerState, ManagerEvent, ManagerSnapshot};
pub use step_runner::{RunnerHandle, SequentialStepRunner, Step, StepEvent};
pub use timer::ResettableTimer;
pub use waiter::{Gate, GateState, OneShotSlot, Waiter};

// Re-export core types for convenience
pub use meshlink_core::{
    Connection, ConnectionEvent, Device, DeviceId, DiscoveryEvent, FrameKind, FromRadio,
    ManagerConfig, MeshError, MeshResult, NodeNum, PortNum, ToRadio, Transport,
};
