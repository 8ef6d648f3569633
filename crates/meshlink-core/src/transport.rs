//! Transport abstraction for MeshLink
//!
//! A [`Transport`] is implemented once per physical medium (BLE, TCP,
//! serial). It discovers devices and opens a [`Connection`] to one of them.
//! The connection manager never branches on the concrete medium; it only
//! picks the transport whose [`TransportKind`] matches the device.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{MeshError, MeshResult};
use crate::protocol::{FromRadio, ToRadio};
use crate::types::{Device, DeviceId, TransportKind};

// ----------------------------------------------------------------------------
// Discovery Events
// ----------------------------------------------------------------------------

/// Events produced while scanning for devices
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// Device seen for the first time
    Found(Device),
    /// Known device re-advertised with changed fields
    Updated(Device),
    /// Device aged out or disappeared
    Lost(DeviceId),
    /// Fresh signal strength sample for a known device
    Signal { id: DeviceId, rssi: i16 },
}

impl DiscoveryEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DiscoveryEvent::Found(device) | DiscoveryEvent::Updated(device) => &device.id,
            DiscoveryEvent::Lost(id) | DiscoveryEvent::Signal { id, .. } => id,
        }
    }
}

/// Stream of discovery events backed by a scan task
///
/// Dropping the stream aborts the scan task, so cancelling a consumer
/// cancels the underlying scan.
pub struct DiscoveryStream {
    receiver: mpsc::Receiver<DiscoveryEvent>,
    task: Option<JoinHandle<()>>,
}

impl DiscoveryStream {
    /// Spawn `scan` with a sender and wrap its output
    pub fn spawn<F, Fut>(buffer: usize, scan: F) -> Self
    where
        F: FnOnce(mpsc::Sender<DiscoveryEvent>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(scan(sender));
        Self {
            receiver,
            task: Some(task),
        }
    }

    /// Wrap an existing receiver with no owned task
    pub fn from_receiver(receiver: mpsc::Receiver<DiscoveryEvent>) -> Self {
        Self {
            receiver,
            task: None,
        }
    }
}

impl Stream for DiscoveryStream {
    type Item = DiscoveryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for DiscoveryStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Events
// ----------------------------------------------------------------------------

/// Everything a live connection reports
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A decoded frame from the device
    Data(FromRadio),
    /// Device debug console text
    LogLine(String),
    /// Signal strength sample in dBm
    Signal(i16),
    /// Session-level failure; `reconnectable` is false when the peer must not be retried automatically
    Error { error: MeshError, reconnectable: bool },
    /// The session closed without an error
    Disconnected,
}

/// Receiver half handed to the connection manager by [`Transport::open`]
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// A live session with one device
#[async_trait]
pub trait Connection: Send + Sync {
    /// Device this session is bound to
    fn device_id(&self) -> &DeviceId;

    /// Whether the underlying link is still up
    fn is_connected(&self) -> bool;

    /// Write one frame; fails with `IoFailed` on medium errors
    async fn send(&self, frame: ToRadio) -> MeshResult<()>;

    /// Pull any frames the device has buffered into the event stream
    ///
    /// Mediums that push every frame as it arrives need not override this.
    async fn drain(&self) -> MeshResult<()> {
        Ok(())
    }

    /// Close the session
    ///
    /// When `should_reconnect` is false the connection reports
    /// [`ConnectionEvent::Disconnected`]; otherwise it reports a reconnectable
    /// error so observers treat the drop as transient.
    async fn disconnect(&self, reason: &str, should_reconnect: bool) -> MeshResult<()>;

    /// The host application is going to the background
    async fn suspend(&self) {}

    /// The host application returned to the foreground
    async fn resume(&self) {}
}

/// One physical medium
#[async_trait]
pub trait Transport: Send + Sync {
    /// Medium identifier used to pick the owning transport for a device
    fn kind(&self) -> TransportKind;

    /// Start scanning; dropping the returned stream stops the scan
    fn discover(&self) -> DiscoveryStream;

    /// Open a session to `device`
    ///
    /// Fails with `DiscoveryFailed` when the device is unknown to the medium
    /// and `ConnectionFailed` when the link cannot be established.
    async fn open(&self, device: &Device) -> MeshResult<(Arc<dyn Connection>, ConnectionEvents)>;
}
