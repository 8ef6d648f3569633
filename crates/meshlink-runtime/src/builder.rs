//! Connection manager builder
//!
//! Collects transports, frame handlers and configuration, then spawns the
//! manager task and returns its handle.

use std::sync::Arc;

use meshlink_core::{FrameKind, ManagerConfig, PortNum, Transport};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::info;

use crate::discovery::DiscoveryAggregator;
use crate::dispatch::{FrameHandler, PacketDispatcher};
use crate::manager::{ConnectionManager, ManagerSnapshot, ManagerTask};
use crate::waiter::Gate;

pub struct ConnectionManagerBuilder {
    config: ManagerConfig,
    transports: Vec<Arc<dyn Transport>>,
    dispatcher: PacketDispatcher,
    start_discovery: bool,
}

impl Default for ConnectionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            transports: Vec::new(),
            dispatcher: PacketDispatcher::new(),
            start_discovery: true,
        }
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a transport; one per [`meshlink_core::TransportKind`]
    pub fn add_transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.add_shared_transport(Arc::new(transport))
    }

    pub fn add_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Route mesh packets on `port` to `handler`
    pub fn on_port(mut self, port: PortNum, handler: impl FrameHandler + 'static) -> Self {
        self.dispatcher.on_port(port, handler);
        self
    }

    /// Route non-packet frames of `kind` to `handler`
    pub fn on_frame(mut self, kind: FrameKind, handler: impl FrameHandler + 'static) -> Self {
        self.dispatcher.on_kind(kind, handler);
        self
    }

    /// Receive every frame without a more specific handler
    pub fn fallback_handler(mut self, handler: impl FrameHandler + 'static) -> Self {
        self.dispatcher.set_fallback(handler);
        self
    }

    /// Whether scanning starts as soon as the manager is built (default true)
    pub fn start_discovery(mut self, enabled: bool) -> Self {
        self.start_discovery = enabled;
        self
    }

    /// Spawn the manager task; must be called inside a Tokio runtime
    pub fn build(self) -> ConnectionManager {
        info!(
            "Building connection manager with {} transport(s)",
            self.transports.len()
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ManagerSnapshot::default());
        let (event_tx, _) = broadcast::channel(self.config.event_buffer_size.max(1));
        let database_ready = Gate::new();

        let mut task = ManagerTask::new(
            self.config,
            DiscoveryAggregator::new(self.transports),
            self.dispatcher,
            command_rx,
            snapshot_tx,
            event_tx.clone(),
            database_ready.clone(),
        );
        task.initialize(self.start_discovery);
        tokio::spawn(task.run());

        ConnectionManager::new(command_tx, snapshot_rx, event_tx, database_ready)
    }
}
