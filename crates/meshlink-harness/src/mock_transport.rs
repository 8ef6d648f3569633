//! Mock Transport for Testing
//!
//! An in-memory [`Transport`] whose devices are announced by the test and
//! whose connections are answered by a [`RadioScript`]. Clones share state,
//! so a test can hand one clone to the manager and keep another to inject
//! events and inspect what was sent.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use meshlink_core::{
    Connection, ConnectionEvent, ConnectionEvents, Device, DeviceId, DiscoveryEvent,
    DiscoveryStream, FromRadio, MeshError, MeshResult, ToRadio, Transport, TransportKind,
};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::radio::{RadioResponse, RadioScript};

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// A recorded `Connection::disconnect` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRecord {
    pub device: DeviceId,
    pub reason: String,
    pub should_reconnect: bool,
}

struct Shared {
    kind: TransportKind,
    script: Mutex<RadioScript>,
    devices: Mutex<Vec<Device>>,
    announcements: broadcast::Sender<DiscoveryEvent>,
    sent: Mutex<Vec<ToRadio>>,
    disconnects: Mutex<Vec<DisconnectRecord>>,
    session: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    opens: AtomicU32,
    open_failures: AtomicU32,
    suspends: AtomicU32,
    resumes: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        let (announcements, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                kind,
                script: Mutex::new(RadioScript::default()),
                devices: Mutex::new(Vec::new()),
                announcements,
                sent: Mutex::new(Vec::new()),
                disconnects: Mutex::new(Vec::new()),
                session: Mutex::new(None),
                opens: AtomicU32::new(0),
                open_failures: AtomicU32::new(0),
                suspends: AtomicU32::new(0),
                resumes: AtomicU32::new(0),
            }),
        }
    }

    pub fn ble() -> Self {
        Self::new(TransportKind::Ble)
    }

    pub fn with_script(self, script: RadioScript) -> Self {
        *lock(&self.shared.script) = script;
        self
    }

    /// Edit the radio script in place
    pub fn script<R>(&self, edit: impl FnOnce(&mut RadioScript) -> R) -> R {
        edit(&mut lock(&self.shared.script))
    }

    /// A device of this transport's kind named `name`
    pub fn device(&self, id: &str, name: &str) -> Device {
        Device::new(id, name, self.shared.kind).with_rssi(-55)
    }

    // ------------------------------------------------------------------------
    // Discovery Control
    // ------------------------------------------------------------------------

    /// Make `device` visible; active scans see `Found` (or `Updated` if known)
    pub fn announce(&self, device: Device) {
        let event = {
            let mut devices = lock(&self.shared.devices);
            match devices.iter_mut().find(|d| d.id == device.id) {
                Some(existing) => {
                    *existing = device.clone();
                    DiscoveryEvent::Updated(device)
                }
                None => {
                    devices.push(device.clone());
                    DiscoveryEvent::Found(device)
                }
            }
        };
        let _ = self.shared.announcements.send(event);
    }

    pub fn lose(&self, id: &DeviceId) {
        lock(&self.shared.devices).retain(|d| &d.id != id);
        let _ = self
            .shared
            .announcements
            .send(DiscoveryEvent::Lost(id.clone()));
    }

    pub fn signal(&self, id: &DeviceId, rssi: i16) {
        let _ = self.shared.announcements.send(DiscoveryEvent::Signal {
            id: id.clone(),
            rssi,
        });
    }

    // ------------------------------------------------------------------------
    // Session Control
    // ------------------------------------------------------------------------

    /// Push an event into the most recently opened session
    pub fn inject(&self, event: ConnectionEvent) -> bool {
        match lock(&self.shared.session).as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn inject_frame(&self, frame: FromRadio) -> bool {
        self.inject(ConnectionEvent::Data(frame))
    }

    /// Fail the next `count` calls to `open`
    pub fn fail_next_opens(&self, count: u32) {
        self.shared.open_failures.store(count, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn open_count(&self) -> u32 {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn sent_frames(&self) -> Vec<ToRadio> {
        lock(&self.shared.sent).clone()
    }

    pub fn heartbeats_sent(&self) -> usize {
        lock(&self.shared.sent)
            .iter()
            .filter(|f| matches!(f, ToRadio::Heartbeat { .. }))
            .count()
    }

    pub fn disconnects(&self) -> Vec<DisconnectRecord> {
        lock(&self.shared.disconnects).clone()
    }

    pub fn suspend_count(&self) -> u32 {
        self.shared.suspends.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> u32 {
        self.shared.resumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    fn discover(&self) -> DiscoveryStream {
        let shared = self.shared.clone();
        DiscoveryStream::spawn(64, move |tx| {
            // subscribe before the snapshot so nothing announced in between is missed
            let mut live = shared.announcements.subscribe();
            let known = lock(&shared.devices).clone();
            async move {
                for device in known {
                    if tx.send(DiscoveryEvent::Found(device)).await.is_err() {
                        return;
                    }
                }
                loop {
                    match live.recv().await {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        })
    }

    async fn open(&self, device: &Device) -> MeshResult<(Arc<dyn Connection>, ConnectionEvents)> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        let pending_failures = self.shared.open_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.shared
                .open_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(MeshError::connection_failed("simulated open failure"));
        }
        if !lock(&self.shared.devices).iter().any(|d| d.id == device.id) {
            return Err(MeshError::discovery_failed(format!(
                "device {} not visible",
                device.id
            )));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        *lock(&self.shared.session) = Some(events_tx.clone());
        debug!("Mock session opened to {}", device.id);

        let connection = MockConnection {
            device_id: device.id.clone(),
            events: events_tx,
            connected: AtomicBool::new(true),
            shared: self.shared.clone(),
        };
        Ok((Arc::new(connection), events_rx))
    }
}

// ----------------------------------------------------------------------------
// Mock Connection
// ----------------------------------------------------------------------------

pub struct MockConnection {
    device_id: DeviceId,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    connected: AtomicBool,
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for MockConnection {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: ToRadio) -> MeshResult<()> {
        if !self.is_connected() {
            return Err(MeshError::io_failed("mock session closed"));
        }

        let response = {
            let mut script = lock(&self.shared.script);
            if script.send_failures > 0 {
                script.send_failures -= 1;
                return Err(MeshError::io_failed("simulated write failure"));
            }
            script.respond(&frame)
        };
        lock(&self.shared.sent).push(frame);

        match response {
            RadioResponse::Frames(frames) => {
                for frame in frames {
                    let _ = self.events.send(ConnectionEvent::Data(frame));
                }
            }
            RadioResponse::TransientError(error) => {
                let _ = self.events.send(ConnectionEvent::Error {
                    error,
                    reconnectable: true,
                });
            }
            RadioResponse::Nothing => {}
        }
        Ok(())
    }

    async fn disconnect(&self, reason: &str, should_reconnect: bool) -> MeshResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        lock(&self.shared.disconnects).push(DisconnectRecord {
            device: self.device_id.clone(),
            reason: reason.to_string(),
            should_reconnect,
        });

        let event = if should_reconnect {
            ConnectionEvent::Error {
                error: MeshError::disconnected(reason),
                reconnectable: true,
            }
        } else {
            ConnectionEvent::Disconnected
        };
        let _ = self.events.send(event);
        Ok(())
    }

    async fn suspend(&self) {
        self.shared.suspends.fetch_add(1, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.shared.resumes.fetch_add(1, Ordering::SeqCst);
    }
}
