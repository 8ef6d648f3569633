//! Connection manager task
//!
//! Single owner of all connection state: device list, active connection,
//! handshake waiters, heartbeat timers, step runner. Everything else talks to
//! it through the mailbox, so no state here is ever shared or locked.

use std::sync::Arc;

use futures::StreamExt;
use meshlink_core::{
    Connection, ConnectionEvent, ConnectionEvents, DeviceId, DeviceState, DiscoveryEvent,
    FromRadio, ManagerConfig, MeshError, MeshResult, NodeNum, ToRadio,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::messages::{Command, HandshakeRequest, Internal, Reply};
use super::state::{ConnectionManagerState, ManagerEvent, ManagerSnapshot};
use super::steps::{self, ConnectContext};
use crate::devices::DeviceList;
use crate::discovery::DiscoveryAggregator;
use crate::dispatch::PacketDispatcher;
use crate::handshake::{HandshakeCoordinator, HandshakeSignal};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatSignal};
use crate::step_runner::{RunnerHandle, StepEvent};
use crate::waiter::{Gate, Waiter};

// ----------------------------------------------------------------------------
// Owned Resources
// ----------------------------------------------------------------------------

struct ActiveScan {
    id: u64,
    task: JoinHandle<()>,
}

struct ActiveRun {
    id: u64,
    handle: RunnerHandle,
}

struct Session {
    id: u64,
    device: DeviceId,
    connection: Arc<dyn Connection>,
    forwarder: JoinHandle<()>,
}

// ----------------------------------------------------------------------------
// Manager Task
// ----------------------------------------------------------------------------

pub(crate) struct ManagerTask {
    config: ManagerConfig,
    aggregator: DiscoveryAggregator,
    dispatcher: PacketDispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    snapshot: watch::Sender<ManagerSnapshot>,
    events: broadcast::Sender<ManagerEvent>,

    state: ConnectionManagerState,
    devices: DeviceList,
    handshake: HandshakeCoordinator,
    heartbeat: HeartbeatMonitor,
    scan: Option<ActiveScan>,
    next_scan: u64,
    runner: Option<ActiveRun>,
    next_run: u64,
    session: Option<Session>,
    next_session: u64,
    active_device: Option<DeviceId>,
    active_node_num: Option<NodeNum>,
    last_error: Option<MeshError>,
    auto_connect_suppressed: bool,
    reconnecting: bool,
    suspended: bool,
    frames_sent: u64,
    frames_received: u64,
}

impl ManagerTask {
    pub(crate) fn new(
        config: ManagerConfig,
        aggregator: DiscoveryAggregator,
        dispatcher: PacketDispatcher,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot: watch::Sender<ManagerSnapshot>,
        events: broadcast::Sender<ManagerEvent>,
        database_ready: Gate,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let heartbeat = HeartbeatMonitor::new(config.heartbeat.clone(), {
            let tx = internal_tx.clone();
            move |signal| {
                let _ = tx.send(Internal::Heartbeat(signal));
            }
        });
        let handshake = HandshakeCoordinator::new(config.min_firmware, database_ready);

        Self {
            config,
            aggregator,
            dispatcher,
            commands,
            internal_rx,
            internal_tx,
            snapshot,
            events,
            state: ConnectionManagerState::Uninitialized,
            devices: DeviceList::new(),
            handshake,
            heartbeat,
            scan: None,
            next_scan: 0,
            runner: None,
            next_run: 0,
            session: None,
            next_session: 0,
            active_device: None,
            active_node_num: None,
            last_error: None,
            auto_connect_suppressed: false,
            reconnecting: false,
            suspended: false,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Leave `uninitialized`; runs before the task is spawned
    pub(crate) fn initialize(&mut self, start_discovery: bool) {
        if start_discovery {
            self.start_discovery();
        } else {
            self.set_state(ConnectionManagerState::Idle);
        }
        self.publish();
    }

    pub(crate) async fn run(mut self) {
        info!("Connection manager running");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("All manager handles dropped, shutting down");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(message) = self.internal_rx.recv() => self.handle_internal(message).await,
            }
        }

        info!("Connection manager stopped");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartDiscovery { reply } => {
                self.start_discovery();
                self.publish();
                let _ = reply.send(Ok(()));
            }
            Command::StopDiscovery { reply } => {
                self.stop_discovery();
                let _ = reply.send(Ok(()));
            }
            Command::Connect { device, reply } => {
                let result = self.connect(device);
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(Ok(()));
            }
            Command::CloseConnection { reply } => {
                self.close_connection("close requested");
                let _ = reply.send(Ok(()));
            }
            Command::Send { frame, reply } => {
                let result = self.send(frame).await;
                let _ = reply.send(result);
            }
            Command::Suspend { reply } => {
                let _ = reply.send(self.suspend().await);
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            // handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn connect(&mut self, id: DeviceId) -> MeshResult<()> {
        if let Some(active) = &self.active_device {
            if *active == id {
                debug!("Already connected or connecting to {}", id);
                return Ok(());
            }
            return Err(MeshError::connection_failed(format!(
                "already connected to {}; disconnect first",
                active
            )));
        }

        self.auto_connect_suppressed = false;
        self.reconnecting = false;
        self.start_connect(&id)
    }

    async fn disconnect(&mut self) {
        info!("Disconnect requested");
        self.auto_connect_suppressed = true;
        self.reconnecting = false;
        if let Some(run) = self.runner.take() {
            run.handle.cancel();
        }
        if let Some(session) = &self.session {
            if let Err(e) = session
                .connection
                .disconnect("user requested", false)
                .await
            {
                warn!("Error while disconnecting {}: {}", session.device, e);
            }
        }
        self.close_connection("user disconnect");
    }

    async fn send(&mut self, frame: ToRadio) -> MeshResult<()> {
        let connection = match &self.session {
            Some(session) if session.connection.is_connected() => session.connection.clone(),
            _ => return Err(MeshError::connection_failed("no active connection")),
        };
        connection.send(frame).await?;
        self.frames_sent += 1;
        self.publish();
        Ok(())
    }

    async fn suspend(&mut self) -> MeshResult<()> {
        if self.suspended {
            return Ok(());
        }
        self.suspended = true;
        self.heartbeat.stop("suspended");
        if let Some(session) = &self.session {
            session.connection.suspend().await;
        }
        info!("Suspended");
        self.publish();
        Ok(())
    }

    async fn resume(&mut self) -> MeshResult<()> {
        if !self.suspended {
            return Ok(());
        }
        self.suspended = false;
        if let Some(session) = &self.session {
            session.connection.resume().await;
            self.heartbeat.start();
        }
        info!("Resumed");
        self.publish();
        Ok(())
    }

    async fn shutdown(&mut self) {
        info!("Shutting down connection manager");
        self.stop_scan();
        self.auto_connect_suppressed = true;
        self.reconnecting = true;
        if let Some(run) = self.runner.take() {
            run.handle.cancel();
        }
        if let Some(session) = &self.session {
            if let Err(e) = session.connection.send(ToRadio::Disconnect).await {
                debug!("Could not send disconnect frame: {}", e);
            }
            if let Err(e) = session.connection.disconnect("shutdown", false).await {
                debug!("Error while disconnecting: {}", e);
            }
        }
        self.close_connection("shutdown");
        self.reconnecting = false;
        self.set_state(ConnectionManagerState::Idle);
        self.publish();
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    fn start_discovery(&mut self) {
        if self.scan.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("Discovery already active");
        } else {
            self.next_scan += 1;
            let id = self.next_scan;
            let mut merged = self.aggregator.discover_all();
            let tx = self.internal_tx.clone();
            let task = tokio::spawn(async move {
                while let Some(event) = merged.next().await {
                    if tx.send(Internal::Discovery { scan: id, event }).is_err() {
                        return;
                    }
                }
                let _ = tx.send(Internal::DiscoveryEnded { scan: id });
            });
            self.scan = Some(ActiveScan { id, task });
            info!("Discovery started");
        }

        if self.active_device.is_none() {
            self.set_state(ConnectionManagerState::Discovering);
        }
    }

    fn stop_discovery(&mut self) {
        self.stop_scan();
        self.devices.retain_only(self.active_device.as_ref());
        self.emit(ManagerEvent::DevicesChanged);
        if self.active_device.is_none() {
            self.set_state(ConnectionManagerState::Idle);
        }
        self.publish();
    }

    fn stop_scan(&mut self) {
        if let Some(scan) = self.scan.take() {
            // the forwarder owns the merged stream; aborting it drops every scan
            scan.task.abort();
            info!("Discovery stopped");
        }
    }

    fn on_discovery_event(&mut self, event: DiscoveryEvent) {
        trace!("Discovery event: {:?}", event);
        if self.devices.apply(&event) {
            self.emit(ManagerEvent::DevicesChanged);
            self.publish();
        }
        if let DiscoveryEvent::Found(device) | DiscoveryEvent::Updated(device) = &event {
            self.maybe_auto_connect(&device.id);
        }
    }

    fn maybe_auto_connect(&mut self, id: &DeviceId) {
        let prefs = &self.config.preferences;
        if !prefs.auto_connect || prefs.preferred_device.as_ref() != Some(id) {
            return;
        }
        if self.auto_connect_suppressed || self.active_device.is_some() {
            return;
        }
        info!("Preferred device {} discovered, connecting", id);
        if let Err(e) = self.start_connect(id) {
            warn!("Auto-connect to {} failed: {}", id, e);
            self.record_error(e);
        }
    }

    // ------------------------------------------------------------------------
    // Connect Sequence
    // ------------------------------------------------------------------------

    fn start_connect(&mut self, id: &DeviceId) -> MeshResult<()> {
        let device = self
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| MeshError::discovery_failed(format!("unknown device {}", id)))?;
        let transport = self.aggregator.transport_for(device.transport).ok_or_else(|| {
            MeshError::connection_failed(format!("no {} transport registered", device.transport))
        })?;

        self.handshake.reset();
        self.next_run += 1;
        let run = self.next_run;

        if let Some(d) = self.devices.get_mut(id) {
            d.state = DeviceState::Connecting;
        }
        self.active_device = Some(id.clone());
        self.set_state(ConnectionManagerState::Connecting);
        info!("Connecting to {} ({}) over {}", device.name, id, device.transport);

        let ctx = ConnectContext {
            run,
            device,
            transport,
            mailbox: self.internal_tx.clone(),
            database_ready: self.handshake.database_ready().clone(),
        };
        let tx = self.internal_tx.clone();
        let handle = steps::connect_sequence(ctx, self.config.retry.clone()).start(move |event| {
            let _ = tx.send(Internal::Step { run, event });
        });
        self.runner = Some(ActiveRun { id: run, handle });
        self.publish();
        Ok(())
    }

    async fn on_step_event(&mut self, event: StepEvent) {
        match event {
            StepEvent::Started { name, attempt, .. } => {
                debug!("Connect step '{}' attempt {}", name, attempt);
            }
            StepEvent::Retrying {
                name,
                attempt,
                error,
                ..
            } => {
                warn!("Connect step '{}' failed ({}), retrying", name, error);
                self.set_state(ConnectionManagerState::Retrying { attempt });
                self.publish();
            }
            StepEvent::Succeeded { name, .. } => self.on_step_succeeded(name),
            StepEvent::Finished(Ok(())) => {
                self.runner = None;
            }
            StepEvent::Finished(Err(error)) => {
                self.runner = None;
                self.on_connect_failed(error).await;
            }
        }
    }

    fn on_step_succeeded(&mut self, name: &'static str) {
        let retrying = matches!(self.state, ConnectionManagerState::Retrying { .. });
        match name {
            steps::OPEN_SESSION if retrying => self.set_state(ConnectionManagerState::Connecting),
            steps::WANT_CONFIG => self.set_state(ConnectionManagerState::Communicating),
            steps::WANT_DATABASE => self.on_subscribed(),
            _ => {}
        }
        self.publish();
    }

    fn on_subscribed(&mut self) {
        self.reconnecting = false;
        self.last_error = None;
        let Some(id) = self.active_device.clone() else {
            return;
        };
        if let Some(d) = self.devices.get_mut(&id) {
            d.state = DeviceState::Connected;
        }
        self.set_state(ConnectionManagerState::Subscribed);
        info!("Subscribed to {}", id);
        self.emit(ManagerEvent::Subscribed {
            device: id,
            node: self.active_node_num,
        });
    }

    async fn on_connect_failed(&mut self, error: MeshError) {
        warn!("Connect sequence failed: {}", error);
        if matches!(
            error,
            MeshError::TooManyRetries { .. } | MeshError::VersionMismatch { .. }
        ) {
            self.auto_connect_suppressed = true;
        }
        self.reconnecting = false;
        self.record_error(error);
        self.release_session("connect failed").await;
        self.close_connection("connect failed");
    }

    fn on_session_opened(
        &mut self,
        run: u64,
        connection: Arc<dyn Connection>,
        events: ConnectionEvents,
        reply: Reply<()>,
    ) {
        let current = self.runner.as_ref().is_some_and(|r| r.id == run);
        let device = match (&self.active_device, current) {
            (Some(device), true) => device.clone(),
            _ => {
                debug!("Dropping session opened by stale connect run {}", run);
                tokio::spawn(async move {
                    let _ = connection.disconnect("superseded", false).await;
                });
                let _ = reply.send(Err(MeshError::Cancelled));
                return;
            }
        };

        if let Some(old) = self.session.take() {
            debug!("Session {} replaced by a reopened session", old.id);
            old.forwarder.abort();
            tokio::spawn(async move {
                if let Err(e) = old.connection.disconnect("replaced", false).await {
                    debug!("Error while releasing replaced session: {}", e);
                }
            });
        }

        self.next_session += 1;
        let id = self.next_session;
        let forwarder = tokio::spawn(forward_connection_events(id, events, self.internal_tx.clone()));
        self.session = Some(Session {
            id,
            device: device.clone(),
            connection,
            forwarder,
        });
        self.heartbeat.set_ack_supported(false);
        self.heartbeat.start();
        debug!("Session {} open to {}", id, device);
        let _ = reply.send(Ok(()));
    }

    async fn on_handshake_request(&mut self, run: u64, request: HandshakeRequest, reply: Reply<Waiter<()>>) {
        let current = self.runner.as_ref().is_some_and(|r| r.id == run);
        let connection = match &self.session {
            Some(session) if current => session.connection.clone(),
            _ => {
                let _ = reply.send(Err(MeshError::connection_failed("no active connection")));
                return;
            }
        };

        let (frame, waiter) = match request {
            HandshakeRequest::Config => self.handshake.begin_want_config(),
            HandshakeRequest::Database => self.handshake.begin_want_database(),
        };

        let result = async {
            connection.send(frame).await?;
            self.frames_sent += 1;
            connection.drain().await
        }
        .await;

        let _ = reply.send(result.map(|()| waiter));
    }

    // ------------------------------------------------------------------------
    // Session Events
    // ------------------------------------------------------------------------

    async fn on_transport_event(&mut self, session: u64, event: ConnectionEvent) {
        if self.session.as_ref().map(|s| s.id) != Some(session) {
            trace!("Dropping event from stale session {}", session);
            return;
        }

        match event {
            ConnectionEvent::Data(frame) => self.on_frame_received(frame),
            ConnectionEvent::LogLine(line) => {
                self.heartbeat.on_data_received();
                debug!(target: "meshlink::device", "{}", line);
            }
            ConnectionEvent::Signal(rssi) => {
                self.heartbeat.on_data_received();
                if let Some(id) = self.active_device.clone() {
                    if self.devices.update_signal(&id, rssi) {
                        self.emit(ManagerEvent::DevicesChanged);
                        self.publish();
                    }
                }
            }
            ConnectionEvent::Error {
                error,
                reconnectable,
            } => self.on_connection_error(error, reconnectable).await,
            ConnectionEvent::Disconnected => {
                info!("Device closed the session");
                self.auto_connect_suppressed = true;
                self.reconnecting = false;
                self.close_connection("peer disconnected");
            }
        }
    }

    async fn on_connection_error(&mut self, error: MeshError, reconnectable: bool) {
        warn!(
            "Connection error ({}): {}",
            if reconnectable { "recoverable" } else { "fatal" },
            error
        );
        if !reconnectable {
            self.auto_connect_suppressed = true;
        }
        self.record_error(error.clone());

        match &self.runner {
            Some(run) => run
                .handle
                .cancel_currently_executing_step(error, !reconnectable),
            None => {
                self.reconnecting = false;
                self.release_session("connection error").await;
                self.close_connection("connection error");
                if reconnectable {
                    self.reconnect_preferred();
                }
            }
        }
    }

    /// Auto-connect to the preferred device if discovery already knows it
    ///
    /// Scans report a device once while it stays visible, so a teardown of
    /// a device that never went away would otherwise wait forever for a
    /// fresh discovery event.
    fn reconnect_preferred(&mut self) {
        let Some(id) = self.config.preferences.preferred_device.clone() else {
            return;
        };
        if self.devices.get(&id).is_some() {
            self.maybe_auto_connect(&id);
        }
    }

    fn on_frame_received(&mut self, frame: FromRadio) {
        self.frames_received += 1;
        self.heartbeat.on_data_received();

        match self.handshake.on_frame(&frame) {
            HandshakeSignal::NodeIdentity(num) => {
                self.active_node_num = Some(num);
                if let Some(id) = self.active_device.clone() {
                    if let Some(d) = self.devices.get_mut(&id) {
                        d.num = Some(num);
                    }
                }
                info!("Connected node is {}", num);
            }
            HandshakeSignal::Firmware(version) => {
                if let Some(id) = self.active_device.clone() {
                    if let Some(d) = self.devices.get_mut(&id) {
                        d.firmware = version;
                    }
                }
                let supported = self.config.heartbeat.supports_ack(version);
                self.heartbeat.set_ack_supported(supported);
            }
            HandshakeSignal::DatabaseEntry { index } => {
                self.set_state(ConnectionManagerState::RetrievingDatabase { node_count: index });
            }
            HandshakeSignal::ConfigComplete
            | HandshakeSignal::DatabaseComplete
            | HandshakeSignal::None => {}
        }

        if !matches!(frame, FromRadio::ConfigComplete { .. }) {
            self.dispatcher.dispatch(&frame);
        }
        self.publish();
    }

    async fn on_heartbeat(&mut self, signal: HeartbeatSignal) {
        match signal {
            HeartbeatSignal::ProbeDue { generation } => {
                let Some(nonce) = self.heartbeat.on_probe_due(generation) else {
                    return;
                };
                trace!("Sending heartbeat {}", nonce);
                match self.send(ToRadio::Heartbeat { nonce }).await {
                    Ok(()) => self.heartbeat.probe_sent(),
                    Err(e) => {
                        warn!("Heartbeat send failed: {}", e);
                        self.on_liveness_failure(e, "heartbeat send failed").await;
                    }
                }
            }
            HeartbeatSignal::TimedOut { generation } => {
                if self.heartbeat.on_timeout(generation) {
                    self.on_liveness_failure(
                        MeshError::timeout("heartbeat response"),
                        "heartbeat timeout",
                    )
                    .await;
                }
            }
        }
    }

    async fn on_liveness_failure(&mut self, error: MeshError, reason: &str) {
        error!("Liveness failure: {}", error);
        self.record_error(error);

        if let Some(run) = self.runner.take() {
            run.handle.cancel();
        }

        let Some(device) = self.session.as_ref().map(|s| s.device.clone()) else {
            self.close_connection("liveness failure");
            return;
        };

        if let Some(session) = &self.session {
            if let Err(e) = session
                .connection
                .disconnect(reason, true)
                .await
            {
                debug!("Error while dropping dead session: {}", e);
            }
        }

        self.reconnecting = true;
        self.close_connection("liveness failure");
        info!("Reconnecting to {}", device);
        if let Err(e) = self.start_connect(&device) {
            warn!("Reconnect to {} failed: {}", device, e);
            self.reconnecting = false;
            self.record_error(e);
            self.close_connection("reconnect failed");
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Ask the active connection to close without reconnecting
    async fn release_session(&mut self, reason: &str) {
        if let Some(session) = &self.session {
            if let Err(e) = session.connection.disconnect(reason, false).await {
                debug!("Error while releasing session: {}", e);
            }
        }
    }

    /// Clear the active connection and every waiter bound to it
    ///
    /// Safe to call any number of times.
    fn close_connection(&mut self, reason: &str) {
        if let Some(run) = self.runner.take() {
            run.handle.cancel();
        }
        self.heartbeat.stop(reason);
        self.handshake.cancel_all();

        if let Some(session) = self.session.take() {
            session.forwarder.abort();
            debug!("Session {} closed ({})", session.id, reason);
        }
        if let Some(id) = self.active_device.take() {
            if let Some(d) = self.devices.get_mut(&id) {
                d.state = DeviceState::Disconnected;
            }
            info!("Disconnected from {} ({})", id, reason);
            self.emit(ManagerEvent::Disconnected { device: id });
        }
        self.active_node_num = None;
        self.suspended = false;

        if !self.reconnecting {
            self.start_discovery();
        }
        self.publish();
    }

    // ------------------------------------------------------------------------
    // Internal Messages
    // ------------------------------------------------------------------------

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Discovery { scan, event } => {
                if self.scan.as_ref().is_some_and(|s| s.id == scan) {
                    self.on_discovery_event(event);
                }
            }
            Internal::DiscoveryEnded { scan } => {
                if self.scan.as_ref().is_some_and(|s| s.id == scan) {
                    debug!("All discovery streams ended");
                    self.scan = None;
                    self.publish();
                }
            }
            Internal::Connection { session, event } => self.on_transport_event(session, event).await,
            Internal::Step { run, event } => {
                if self.runner.as_ref().is_some_and(|r| r.id == run) {
                    self.on_step_event(event).await;
                } else {
                    trace!("Dropping event from stale connect run {}", run);
                }
            }
            Internal::Heartbeat(signal) => self.on_heartbeat(signal).await,
            Internal::SessionOpened {
                run,
                connection,
                events,
                reply,
            } => self.on_session_opened(run, connection, events, reply),
            Internal::Handshake {
                run,
                request,
                reply,
            } => self.on_handshake_request(run, request, reply).await,
        }
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionManagerState) {
        if self.state == state {
            return;
        }
        info!("State: {} -> {}", self.state, state);
        self.state = state;
        self.emit(ManagerEvent::StateChanged(state));
    }

    fn record_error(&mut self, error: MeshError) {
        self.last_error = Some(error.clone());
        self.emit(ManagerEvent::ConnectionError(error));
    }

    fn emit(&self, event: ManagerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(ManagerSnapshot {
            state: self.state,
            devices: self.devices.as_slice().to_vec(),
            active_device: self.active_device.clone(),
            active_node_num: self.active_node_num,
            last_error: self.last_error.clone(),
            discovering: self.scan.is_some(),
            suspended: self.suspended,
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
        });
    }
}

async fn forward_connection_events(
    session: u64,
    mut events: ConnectionEvents,
    mailbox: mpsc::UnboundedSender<Internal>,
) {
    while let Some(event) = events.recv().await {
        if mailbox.send(Internal::Connection { session, event }).is_err() {
            return;
        }
    }
    trace!("Session {} event stream ended", session);
}
