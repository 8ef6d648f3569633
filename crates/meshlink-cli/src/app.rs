//! Wires the configured transports into a connection manager

use std::time::Duration;

use meshlink_ble::BleTransport;
use meshlink_core::{FromRadio, ManagerConfig, MeshError, PortNum};
use meshlink_runtime::{
    ConnectionManager, ConnectionManagerBuilder, ConnectionManagerState, DeviceId, ManagerEvent,
};
use meshlink_stream::{SerialTransport, TcpTransport};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Transport Selection
// ----------------------------------------------------------------------------

/// Which transports the manager gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSelection {
    pub ble: bool,
    pub tcp: bool,
    pub serial: bool,
}

impl TransportSelection {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            ble: !cli.no_ble,
            tcp: !cli.no_tcp,
            serial: !cli.no_serial,
        }
    }

    pub fn any(&self) -> bool {
        self.ble || self.tcp || self.serial
    }
}

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

pub struct MeshApp {
    config: AppConfig,
    transports: TransportSelection,
}

impl MeshApp {
    pub fn new(config: AppConfig, transports: TransportSelection) -> Result<Self> {
        if !transports.any() {
            return Err(CliError::NoTransport);
        }
        Ok(Self { config, transports })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build and start a manager that prints inbound traffic
    pub fn start(&self, manager_config: ManagerConfig) -> ConnectionManager {
        let mut builder = ConnectionManagerBuilder::new()
            .with_config(manager_config)
            .on_port(PortNum::TextMessage, |frame: &FromRadio| {
                if let Some(line) = describe_frame(frame) {
                    println!("{}", line);
                }
            })
            .fallback_handler(|frame: &FromRadio| match describe_frame(frame) {
                Some(line) => info!("{}", line),
                None => debug!("Received {} frame", frame.kind()),
            });

        if self.transports.ble {
            builder = builder.add_transport(BleTransport::with_config(self.config.ble.clone()));
        }
        if self.transports.tcp {
            builder = builder.add_transport(TcpTransport::with_config(self.config.tcp.clone()));
        }
        if self.transports.serial {
            builder =
                builder.add_transport(SerialTransport::with_config(self.config.serial.clone()));
        }
        builder.build()
    }
}

/// One-line rendering of frames worth showing to a user
pub fn describe_frame(frame: &FromRadio) -> Option<String> {
    match frame {
        FromRadio::Packet(packet) if packet.port == PortNum::TextMessage => Some(format!(
            "[{} -> {} ch{}] {}",
            packet.from,
            packet.to,
            packet.channel,
            String::from_utf8_lossy(&packet.payload)
        )),
        FromRadio::Packet(packet) => Some(format!(
            "{:?} packet from {} ({} bytes)",
            packet.port,
            packet.from,
            packet.payload.len()
        )),
        FromRadio::NodeInfo(node) => Some(format!(
            "Node {} {} ({})",
            node.num, node.long_name, node.short_name
        )),
        FromRadio::LogRecord(record) => Some(format!(
            "Device log [{}] {}: {}",
            record.level, record.source, record.message
        )),
        FromRadio::Rebooted => Some("Device rebooted".to_string()),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Waiting Helpers
// ----------------------------------------------------------------------------

/// Wait until discovery reports `device`
pub async fn wait_for_device(
    manager: &ConnectionManager,
    device: &DeviceId,
    limit: Duration,
) -> Result<()> {
    let found = tokio::time::timeout(
        limit,
        manager.wait_for(|s| s.devices.iter().any(|d| &d.id == device)),
    )
    .await;
    match found {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(CliError::DeviceNotFound(device.to_string())),
    }
}

/// Follow manager events until the session is subscribed or the connect
/// sequence gives up
pub async fn wait_until_subscribed(
    events: &mut broadcast::Receiver<ManagerEvent>,
    limit: Duration,
) -> Result<()> {
    let outcome = tokio::time::timeout(limit, async {
        let mut last_error = None;
        let mut started = false;
        loop {
            match events.recv().await {
                Ok(ManagerEvent::StateChanged(ConnectionManagerState::Subscribed)) => return Ok(()),
                Ok(ManagerEvent::StateChanged(state)) if state.is_connecting() => started = true,
                Ok(ManagerEvent::StateChanged(
                    ConnectionManagerState::Discovering | ConnectionManagerState::Idle,
                )) if started => {
                    return Err(last_error
                        .unwrap_or_else(|| MeshError::connection_failed("connect sequence ended")));
                }
                Ok(ManagerEvent::ConnectionError(error)) => {
                    debug!("Connect attempt failed: {}", error);
                    last_error = Some(error);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Missed {} manager events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(MeshError::Cancelled),
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result.map_err(CliError::from),
        Err(_) => Err(MeshError::timeout("connect").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::protocol::LogRecord;
    use meshlink_core::{MeshPacket, NodeNum};

    #[test]
    fn test_describe_text_packet() {
        let mut packet = MeshPacket::text(NodeNum::BROADCAST, "hello mesh").with_channel(1);
        packet.from = NodeNum(0x1234abcd);

        assert_eq!(
            describe_frame(&FromRadio::Packet(packet)).as_deref(),
            Some("[!1234abcd -> !ffffffff ch1] hello mesh")
        );
    }

    #[test]
    fn test_describe_skips_handshake_frames() {
        assert_eq!(describe_frame(&FromRadio::ConfigComplete { nonce: 69420 }), None);
        let log = FromRadio::LogRecord(LogRecord {
            level: "INFO".into(),
            source: "radio".into(),
            message: "booted".into(),
        });
        assert_eq!(
            describe_frame(&log).as_deref(),
            Some("Device log [INFO] radio: booted")
        );
    }

    #[test]
    fn test_no_transport_rejected() {
        let selection = TransportSelection {
            ble: false,
            tcp: false,
            serial: false,
        };
        assert!(matches!(
            MeshApp::new(AppConfig::default(), selection),
            Err(CliError::NoTransport)
        ));
    }

    #[tokio::test]
    async fn test_wait_until_subscribed_reports_terminal_error() {
        let (tx, mut rx) = broadcast::channel(16);
        tx.send(ManagerEvent::StateChanged(ConnectionManagerState::Connecting))
            .unwrap();
        tx.send(ManagerEvent::ConnectionError(MeshError::TooManyRetries {
            attempts: 3,
            last_error: "refused".into(),
        }))
        .unwrap();
        tx.send(ManagerEvent::StateChanged(ConnectionManagerState::Discovering))
            .unwrap();

        let result = wait_until_subscribed(&mut rx, Duration::from_secs(5)).await;
        assert!(matches!(
            result,
            Err(CliError::Mesh(MeshError::TooManyRetries { attempts: 3, .. }))
        ));
    }

    #[tokio::test]
    async fn test_wait_until_subscribed_succeeds() {
        let (tx, mut rx) = broadcast::channel(16);
        tx.send(ManagerEvent::StateChanged(ConnectionManagerState::Discovering))
            .unwrap();
        tx.send(ManagerEvent::StateChanged(ConnectionManagerState::Connecting))
            .unwrap();
        tx.send(ManagerEvent::StateChanged(ConnectionManagerState::Subscribed))
            .unwrap();

        assert!(wait_until_subscribed(&mut rx, Duration::from_secs(5)).await.is_ok());
    }
}
