//! BLE session with a single mesh radio
//!
//! The radio queues outbound frames behind the `FromRadio` characteristic and
//! bumps `FromNum` whenever the queue grows. The session subscribes to
//! `FromNum`, and on each notification (or an explicit [`Connection::drain`])
//! reads `FromRadio` until it returns an empty value. Writes go to `ToRadio`
//! with response so the radio acknowledges each frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::{BoxStream, StreamExt};
use meshlink_core::{
    Connection, ConnectionEvent, ConnectionEvents, DeviceId, FromRadio, MeshError, MeshResult,
    ToRadio,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::config::BleTransportConfig;
use crate::discovery::{lock_registry, SharedRegistry};
use crate::error::BleTransportError;
use crate::protocol::{FROM_NUM_UUID, FROM_RADIO_UUID, LOG_RADIO_UUID, TO_RADIO_UUID};

/// Upper bound on reads per drain, in case a radio never reports empty
const MAX_READS_PER_DRAIN: usize = 512;

const MIN_RSSI_POLL: std::time::Duration = std::time::Duration::from_millis(500);

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Shared between the connection handle and its background tasks
struct Link {
    device_id: DeviceId,
    connected: AtomicBool,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    registry: SharedRegistry,
}

impl Link {
    fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Mark the link down; only the first caller gets `true` and reports
    fn close(&self) -> bool {
        if self.connected.swap(false, Ordering::SeqCst) {
            lock_registry(&self.registry).unpin(&self.device_id);
            true
        } else {
            false
        }
    }

    fn lost(&self, reason: &str) {
        if self.close() {
            warn!("BLE link to {} lost: {}", self.device_id, reason);
            self.emit(ConnectionEvent::Error {
                error: MeshError::disconnected(reason),
                reconnectable: true,
            });
        }
    }
}

// ----------------------------------------------------------------------------
// Frame Reader
// ----------------------------------------------------------------------------

#[derive(Clone)]
struct FrameReader {
    link: Arc<Link>,
    peripheral: Peripheral,
    from_radio: Characteristic,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl FrameReader {
    /// Read `FromRadio` until the radio has nothing queued
    async fn drain(&self) -> Result<usize, BleTransportError> {
        let _guard = self.lock.lock().await;
        let mut frames = 0;

        for _ in 0..MAX_READS_PER_DRAIN {
            let value = self
                .peripheral
                .read(&self.from_radio)
                .await
                .map_err(|e| BleTransportError::ReadFailed(e.to_string()))?;
            if value.is_empty() {
                break;
            }
            match FromRadio::decode(&value) {
                Ok(frame) => {
                    frames += 1;
                    if !self.link.emit(ConnectionEvent::Data(frame)) {
                        break;
                    }
                }
                Err(e) => warn!(
                    "Undecodable frame from {} ({} bytes): {}",
                    self.link.device_id,
                    value.len(),
                    e
                ),
            }
        }

        if frames > 0 {
            trace!("Drained {} frames from {}", frames, self.link.device_id);
        }
        Ok(frames)
    }
}

// ----------------------------------------------------------------------------
// BLE Connection
// ----------------------------------------------------------------------------

pub struct BleConnection {
    link: Arc<Link>,
    peripheral: Peripheral,
    to_radio: Characteristic,
    reader: FrameReader,
    max_frame_size: usize,
    polling: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BleConnection {
    /// Connect, discover the mesh service and start listening
    pub(crate) async fn open(
        device_id: DeviceId,
        peripheral: Peripheral,
        config: &BleTransportConfig,
        registry: SharedRegistry,
    ) -> Result<(Arc<Self>, ConnectionEvents), BleTransportError> {
        let link_up = async {
            peripheral
                .connect()
                .await
                .map_err(|e| BleTransportError::ConnectionFailed(e.to_string()))?;
            peripheral
                .discover_services()
                .await
                .map_err(|e| BleTransportError::ServiceDiscoveryFailed(e.to_string()))
        };

        match timeout(config.connection_timeout, link_up).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", device_id, e);
                release(&peripheral).await;
                return Err(e);
            }
            Err(_) => {
                error!("Connection to {} timed out", device_id);
                release(&peripheral).await;
                return Err(BleTransportError::ConnectionTimeout);
            }
        }
        info!("Connected to {}", device_id);

        match Self::start(device_id, peripheral.clone(), config, registry).await {
            Ok(opened) => Ok(opened),
            Err(e) => {
                error!("Failed to set up mesh service: {}", e);
                release(&peripheral).await;
                Err(e)
            }
        }
    }

    async fn start(
        device_id: DeviceId,
        peripheral: Peripheral,
        config: &BleTransportConfig,
        registry: SharedRegistry,
    ) -> Result<(Arc<Self>, ConnectionEvents), BleTransportError> {
        let characteristics = peripheral.characteristics();
        let find = |uuid: uuid::Uuid| characteristics.iter().find(|c| c.uuid == uuid).cloned();
        let missing = |name: &str| BleTransportError::CharacteristicNotFound {
            characteristic: name.to_string(),
        };

        let to_radio = find(TO_RADIO_UUID).ok_or_else(|| missing("ToRadio"))?;
        let from_radio = find(FROM_RADIO_UUID).ok_or_else(|| missing("FromRadio"))?;
        let from_num = find(FROM_NUM_UUID).ok_or_else(|| missing("FromNum"))?;
        let log_radio = find(LOG_RADIO_UUID);

        // take the stream before subscribing so no notification is missed
        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed(e.to_string()))?;
        peripheral
            .subscribe(&from_num)
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed(e.to_string()))?;
        match &log_radio {
            Some(log_radio) => {
                if let Err(e) = peripheral.subscribe(log_radio).await {
                    warn!("Device log unavailable on {}: {}", device_id, e);
                }
            }
            None => debug!("{} has no log characteristic", device_id),
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        lock_registry(&registry).pin(&device_id);
        let link = Arc::new(Link {
            device_id,
            connected: AtomicBool::new(true),
            events: events_tx,
            registry,
        });
        let reader = FrameReader {
            link: link.clone(),
            peripheral: peripheral.clone(),
            from_radio,
            lock: Arc::new(tokio::sync::Mutex::new(())),
        };
        let polling = Arc::new(AtomicBool::new(true));

        let tasks = vec![
            tokio::spawn(notification_loop(notifications, reader.clone())),
            tokio::spawn(signal_loop(
                link.clone(),
                peripheral.clone(),
                polling.clone(),
                config.rssi_poll_interval,
            )),
        ];

        let connection = Self {
            link,
            peripheral,
            to_radio,
            reader,
            max_frame_size: config.max_frame_size,
            polling,
            tasks: Mutex::new(tasks),
        };
        Ok((Arc::new(connection), events_rx))
    }

    fn stop_tasks(&self) {
        let tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            task.abort();
        }
    }
}

async fn release(peripheral: &Peripheral) {
    if let Err(e) = peripheral.disconnect().await {
        debug!("Failed to release peripheral: {}", e);
    }
}

async fn notification_loop(mut notifications: BoxStream<'static, ValueNotification>, reader: FrameReader) {
    while let Some(notification) = notifications.next().await {
        if notification.uuid == FROM_NUM_UUID {
            if let Err(e) = reader.drain().await {
                reader.link.lost(&e.to_string());
                return;
            }
        } else if notification.uuid == LOG_RADIO_UUID {
            let line = String::from_utf8_lossy(&notification.value).trim_end().to_string();
            if !line.is_empty() && !reader.link.emit(ConnectionEvent::LogLine(line)) {
                return;
            }
        }
    }
    reader.link.lost("notification stream ended");
}

/// Poll link liveness and RSSI; a sample is reported only when it moves
async fn signal_loop(
    link: Arc<Link>,
    peripheral: Peripheral,
    polling: Arc<AtomicBool>,
    period: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(period.max(MIN_RSSI_POLL));
    ticker.tick().await;
    let mut last_rssi: Option<i16> = None;

    loop {
        ticker.tick().await;
        if !polling.load(Ordering::SeqCst) {
            continue;
        }
        if !peripheral.is_connected().await.unwrap_or(false) {
            link.lost("link lost");
            return;
        }
        let rssi = match peripheral.properties().await {
            Ok(Some(properties)) => properties.rssi,
            Ok(None) => None,
            Err(e) => {
                debug!("RSSI read on {} failed: {}", link.device_id, e);
                None
            }
        };
        if let Some(rssi) = rssi {
            if last_rssi != Some(rssi) {
                last_rssi = Some(rssi);
                if !link.emit(ConnectionEvent::Signal(rssi)) {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Connection for BleConnection {
    fn device_id(&self) -> &DeviceId {
        &self.link.device_id
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: ToRadio) -> MeshResult<()> {
        if !self.is_connected() {
            return Err(BleTransportError::NotConnected.into());
        }
        let bytes = frame.encode()?;
        if bytes.len() > self.max_frame_size {
            return Err(BleTransportError::FrameTooLarge {
                size: bytes.len(),
                max_size: self.max_frame_size,
            }
            .into());
        }

        self.peripheral
            .write(&self.to_radio, &bytes, WriteType::WithResponse)
            .await
            .map_err(|e| BleTransportError::WriteFailed(e.to_string()))?;
        trace!("Wrote {} bytes to {}", bytes.len(), self.link.device_id);
        Ok(())
    }

    async fn drain(&self) -> MeshResult<()> {
        if !self.is_connected() {
            return Err(BleTransportError::NotConnected.into());
        }
        self.reader.drain().await?;
        Ok(())
    }

    async fn disconnect(&self, reason: &str, should_reconnect: bool) -> MeshResult<()> {
        if !self.link.close() {
            return Ok(());
        }
        self.stop_tasks();
        release(&self.peripheral).await;
        info!("Disconnected from {} ({})", self.link.device_id, reason);

        let event = if should_reconnect {
            ConnectionEvent::Error {
                error: MeshError::disconnected(reason),
                reconnectable: true,
            }
        } else {
            ConnectionEvent::Disconnected
        };
        self.link.emit(event);
        Ok(())
    }

    async fn suspend(&self) {
        self.polling.store(false, Ordering::SeqCst);
        debug!("Paused RSSI polling on {}", self.link.device_id);
    }

    async fn resume(&self) {
        self.polling.store(true, Ordering::SeqCst);
        if self.is_connected() {
            if let Err(e) = self.reader.drain().await {
                warn!("Drain after resume failed on {}: {}", self.link.device_id, e);
            }
        }
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}
