//! Connection Manager
//!
//! [`ConnectionManager`] is a cheap, clonable handle to the manager task
//! spawned by [`crate::ConnectionManagerBuilder`]. Requests are queued to the
//! task and answered in order; state is observed through a `watch` snapshot
//! and a `broadcast` stream of [`ManagerEvent`]s.

mod messages;
mod state;
mod steps;
mod task;

pub(crate) use task::ManagerTask;

pub use state::{ConnectionManagerState, ManagerEvent, ManagerSnapshot};

use meshlink_core::{
    Device, DeviceId, MeshError, MeshPacket, MeshResult, NodeNum, ToRadio,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::waiter::Gate;
use messages::{Command, Reply};

#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ManagerSnapshot>,
    events: broadcast::Sender<ManagerEvent>,
    database_ready: Gate,
}

impl ConnectionManager {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<ManagerSnapshot>,
        events: broadcast::Sender<ManagerEvent>,
        database_ready: Gate,
    ) -> Self {
        Self {
            commands,
            snapshot,
            events,
            database_ready,
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Start scanning on every transport; a no-op if already scanning
    pub async fn start_discovery(&self) -> MeshResult<()> {
        self.request(|reply| Command::StartDiscovery { reply }).await
    }

    /// Stop scanning and forget every device except the active one
    pub async fn stop_discovery(&self) -> MeshResult<()> {
        self.request(|reply| Command::StopDiscovery { reply }).await
    }

    /// Begin the connect sequence for a discovered device
    ///
    /// Returns once the sequence has started. Fails fast when another device
    /// is active. Progress is visible through [`ConnectionManager::state`].
    pub async fn connect(&self, device: impl Into<DeviceId>) -> MeshResult<()> {
        let device = device.into();
        self.request(|reply| Command::Connect { device, reply }).await
    }

    /// Cancel any connect in flight and close the active session for good
    pub async fn disconnect(&self) -> MeshResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Tear down the active session and return to discovery
    pub async fn close_connection(&self) -> MeshResult<()> {
        self.request(|reply| Command::CloseConnection { reply }).await
    }

    /// Send one frame on the active session
    pub async fn send(&self, frame: ToRadio) -> MeshResult<()> {
        self.request(|reply| Command::Send { frame, reply }).await
    }

    /// Send a text message to `to` on `channel`
    pub async fn send_text(&self, to: NodeNum, channel: u8, text: &str) -> MeshResult<()> {
        let packet = MeshPacket::text(to, text)
            .with_channel(channel)
            .with_want_ack(!to.is_broadcast());
        self.send(ToRadio::Packet(packet)).await
    }

    pub async fn suspend(&self) -> MeshResult<()> {
        self.request(|reply| Command::Suspend { reply }).await
    }

    pub async fn resume(&self) -> MeshResult<()> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Stop discovery, close the session and end the manager task
    pub async fn shutdown(&self) -> MeshResult<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            // already gone
            Err(MeshError::Cancelled) => Ok(()),
            other => other,
        }
    }

    /// Resolve once the node database of the current session is complete
    ///
    /// Fails with `Cancelled` if the session is torn down first.
    pub async fn wait_for_database_ready(&self) -> MeshResult<()> {
        self.database_ready.wait().await
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> ManagerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ConnectionManagerState {
        self.snapshot.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.state().is_connecting()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.snapshot.borrow().devices.clone()
    }

    pub fn active_node_num(&self) -> Option<NodeNum> {
        self.snapshot.borrow().active_node_num
    }

    pub fn last_error(&self) -> Option<MeshError> {
        self.snapshot.borrow().last_error.clone()
    }

    /// Receiver that sees every published snapshot
    pub fn watch(&self) -> watch::Receiver<ManagerSnapshot> {
        self.snapshot.clone()
    }

    /// Ordered stream of state transitions and notable events
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Wait until the snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> MeshResult<ManagerSnapshot>
    where
        F: FnMut(&ManagerSnapshot) -> bool,
    {
        let mut receiver = self.snapshot.clone();
        let snapshot = receiver
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| MeshError::Cancelled)?;
        Ok(snapshot.clone())
    }

    async fn request<T, F>(&self, build: F) -> MeshResult<T>
    where
        F: FnOnce(Reply<T>) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| MeshError::Cancelled)?;
        response.await.unwrap_or(Err(MeshError::Cancelled))
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
