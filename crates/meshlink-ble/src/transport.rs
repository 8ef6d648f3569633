//! BLE transport implementation

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use btleplug::platform::Adapter;
use meshlink_core::{
    Connection, ConnectionEvents, Device, DiscoveryEvent, DiscoveryStream, MeshResult, Transport,
    TransportKind,
};
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, error};

use crate::config::BleTransportConfig;
use crate::connection::BleConnection;
use crate::discovery::{default_adapter, lock_registry, run_scan, SharedRegistry};
use crate::error::BleTransportError;
use crate::registry::PeripheralRegistry;

// ----------------------------------------------------------------------------
// BLE Transport
// ----------------------------------------------------------------------------

/// Scans for mesh radios over Bluetooth LE and opens GATT sessions to them
///
/// The adapter is acquired lazily on the first scan or open. Devices can only
/// be opened after a scan has reported them, because the platform peripheral
/// handle comes from the scan.
#[derive(Clone)]
pub struct BleTransport {
    config: BleTransportConfig,
    adapter: Arc<OnceCell<Adapter>>,
    registry: SharedRegistry,
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport {
    /// Create a new BLE transport with default configuration
    pub fn new() -> Self {
        Self::with_config(BleTransportConfig::default())
    }

    /// Create a new BLE transport with custom configuration
    pub fn with_config(config: BleTransportConfig) -> Self {
        Self {
            config,
            adapter: Arc::new(OnceCell::new()),
            registry: Arc::new(Mutex::new(PeripheralRegistry::new())),
        }
    }

    pub fn config(&self) -> &BleTransportConfig {
        &self.config
    }

    /// Number of peripherals currently known to the scan
    pub fn known_devices(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    async fn adapter(&self) -> Result<Adapter, BleTransportError> {
        self.adapter
            .get_or_try_init(default_adapter)
            .await
            .cloned()
    }
}

async fn scan(transport: BleTransport, tx: mpsc::Sender<DiscoveryEvent>) {
    let adapter = match transport.adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("BLE discovery unavailable: {}", e);
            return;
        }
    };
    if let Err(e) = run_scan(adapter, transport.config.clone(), transport.registry.clone(), tx).await {
        error!("BLE scan failed: {}", e);
    }
    debug!("BLE scan task finished");
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn discover(&self) -> DiscoveryStream {
        let transport = self.clone();
        DiscoveryStream::spawn(64, move |tx| scan(transport, tx))
    }

    async fn open(&self, device: &Device) -> MeshResult<(Arc<dyn Connection>, ConnectionEvents)> {
        let peripheral = lock_registry(&self.registry)
            .handle(&device.id)
            .ok_or_else(|| BleTransportError::DeviceNotDiscovered {
                device_id: device.id.to_string(),
            })?;

        let (connection, events) =
            BleConnection::open(device.id.clone(), peripheral, &self.config, self.registry.clone())
                .await?;
        Ok((connection as Arc<dyn Connection>, events))
    }
}
