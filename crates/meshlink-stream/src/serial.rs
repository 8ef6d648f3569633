//! Serial transport
//!
//! USB-attached radios speak the same framed API as TCP at 115200 baud.
//! Discovery enumerates serial ports on an interval; the port path is the
//! device id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshlink_core::{
    Connection, ConnectionEvents, Device, DiscoveryStream, MeshResult, Transport, TransportKind,
};
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};
use tracing::{debug, info, warn};

use crate::config::SerialTransportConfig;
use crate::connection::StreamConnection;
use crate::error::StreamTransportError;
use crate::presence::PresenceTracker;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Map a port to a device, preferring the USB product string as its name
fn port_device(info: SerialPortInfo, usb_only: bool) -> Option<Device> {
    let name = match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| info.port_name.clone()),
        _ if usb_only => return None,
        _ => info.port_name.clone(),
    };
    Some(Device::new(info.port_name, name, TransportKind::Serial))
}

fn list_ports(usb_only: bool) -> Result<Vec<Device>, StreamTransportError> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| StreamTransportError::PortEnumerationFailed(e.to_string()))?;
    Ok(ports
        .into_iter()
        .filter_map(|port| port_device(port, usb_only))
        .collect())
}

// ----------------------------------------------------------------------------
// Serial Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SerialTransport {
    config: SerialTransportConfig,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SerialTransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerialTransportConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn discover(&self) -> DiscoveryStream {
        let config = self.config.clone();
        DiscoveryStream::spawn(32, move |tx| async move {
            let mut presence = PresenceTracker::new();
            let mut ticker = tokio::time::interval(config.poll_interval.max(MIN_POLL_INTERVAL));
            loop {
                ticker.tick().await;
                let usb_only = config.usb_only;
                let ports = match tokio::task::spawn_blocking(move || list_ports(usb_only)).await {
                    Ok(Ok(ports)) => ports,
                    Ok(Err(e)) => {
                        warn!("{}", e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Serial port enumeration task failed: {}", e);
                        continue;
                    }
                };

                for event in presence.update(ports) {
                    debug!("Serial discovery: {:?}", event);
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    async fn open(&self, device: &Device) -> MeshResult<(Arc<dyn Connection>, ConnectionEvents)> {
        let path = device.id.as_str();
        info!("Opening {} at {} baud", path, self.config.baud_rate);

        let port = tokio_serial::new(path, self.config.baud_rate)
            .open_native_async()
            .map_err(|e| StreamTransportError::PortOpenFailed {
                port: path.to_string(),
                reason: e.to_string(),
            })?;

        let (connection, events) = StreamConnection::start(device.id.clone(), port).await?;
        let connection: Arc<dyn Connection> = connection;
        Ok((connection, events))
    }
}
