//! TCP transport
//!
//! Network-attached radios expose the framed API on port 4403. There is no
//! broadcast discovery: configured hosts are probed on an interval and the
//! ones that accept a connection are reported as devices.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use meshlink_core::{
    Connection, ConnectionEvents, Device, DiscoveryStream, MeshResult, Transport, TransportKind,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{TcpTransportConfig, DEFAULT_TCP_PORT};
use crate::connection::StreamConnection;
use crate::error::StreamTransportError;
use crate::presence::PresenceTracker;

const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Resolve a configured host to `host:port`, adding the default port
pub fn normalize_host(host: &str) -> Result<String, StreamTransportError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(StreamTransportError::InvalidAddress(host.to_string()));
    }
    if host.parse::<SocketAddr>().is_ok() {
        return Ok(host.to_string());
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_TCP_PORT).to_string());
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(host.to_string())
        }
        Some(_) => Err(StreamTransportError::InvalidAddress(host.to_string())),
        None => Ok(format!("{}:{}", host, DEFAULT_TCP_PORT)),
    }
}

async fn connect(address: &str, limit: Duration) -> Result<TcpStream, StreamTransportError> {
    match timeout(limit, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(StreamTransportError::ConnectFailed {
            address: address.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(StreamTransportError::ConnectTimeout {
            address: address.to_string(),
        }),
    }
}

// ----------------------------------------------------------------------------
// TCP Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn discover(&self) -> DiscoveryStream {
        let config = self.config.clone();
        DiscoveryStream::spawn(32, move |tx| async move {
            let hosts: Vec<String> = config
                .hosts
                .iter()
                .filter_map(|host| match normalize_host(host) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        warn!("Ignoring TCP host: {}", e);
                        None
                    }
                })
                .collect();
            if hosts.is_empty() {
                debug!("No TCP hosts configured");
                return;
            }

            let mut presence = PresenceTracker::new();
            let mut ticker = tokio::time::interval(config.probe_interval.max(MIN_PROBE_INTERVAL));
            loop {
                ticker.tick().await;
                let probes = join_all(
                    hosts
                        .iter()
                        .map(|address| connect(address, config.connect_timeout)),
                )
                .await;

                let reachable = hosts
                    .iter()
                    .zip(probes)
                    .filter(|(_, probe)| probe.is_ok())
                    .map(|(address, _)| Device::new(address.as_str(), address.as_str(), TransportKind::Tcp))
                    .collect();

                for event in presence.update(reachable) {
                    debug!("TCP discovery: {:?}", event);
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    async fn open(&self, device: &Device) -> MeshResult<(Arc<dyn Connection>, ConnectionEvents)> {
        let address = normalize_host(device.id.as_str())?;
        info!("Connecting to {} over TCP", address);

        let stream = connect(&address, self.config.connect_timeout).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", address, e);
        }

        let (connection, events) = StreamConnection::start(device.id.clone(), stream).await?;
        let connection: Arc<dyn Connection> = connection;
        Ok((connection, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use meshlink_core::protocol::WAKE_SEQUENCE;
    use meshlink_core::{DeviceId, DiscoveryEvent, MeshError};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("meshtastic.local").unwrap(), "meshtastic.local:4403");
        assert_eq!(normalize_host("10.0.0.5").unwrap(), "10.0.0.5:4403");
        assert_eq!(normalize_host("10.0.0.5:1234").unwrap(), "10.0.0.5:1234");
        assert_eq!(normalize_host("::1").unwrap(), "[::1]:4403");
        assert_eq!(normalize_host(" radio:80 ").unwrap(), "radio:80");
        assert!(normalize_host("radio:http").is_err());
        assert!(normalize_host("").is_err());
    }

    fn transport_for(address: &str) -> TcpTransport {
        TcpTransport::with_config(
            TcpTransportConfig::new()
                .with_host(address)
                .with_probe_interval(Duration::from_millis(50))
                .with_connect_timeout(Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_probe_reports_found_then_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let transport = transport_for(&address);

        let mut scan = transport.discover();
        match scan.next().await {
            Some(DiscoveryEvent::Found(device)) => {
                assert_eq!(device.id, DeviceId::new(address.as_str()));
                assert_eq!(device.transport, TransportKind::Tcp);
            }
            other => panic!("unexpected {other:?}"),
        }

        drop(listener);
        assert_eq!(
            scan.next().await,
            Some(DiscoveryEvent::Lost(DeviceId::new(address.as_str())))
        );
    }

    #[tokio::test]
    async fn test_no_hosts_ends_scan() {
        let mut scan = TcpTransport::new().discover();
        assert_eq!(scan.next().await, None);
    }

    #[tokio::test]
    async fn test_open_sends_wake_sequence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let transport = transport_for(&address);
        let device = Device::new(address.as_str(), "radio", TransportKind::Tcp);

        let (connection, _events) = transport.open(&device).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut wake = [0u8; 32];
        socket.read_exact(&mut wake).await.unwrap();
        assert_eq!(wake, WAKE_SEQUENCE);
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let device = Device::new(address.as_str(), "radio", TransportKind::Tcp);
        let result = transport_for(&address).open(&device).await;
        assert!(matches!(result, Err(MeshError::ConnectionFailed { .. })));
    }
}
