//! BLE adapter setup and scanning for mesh radios

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use btleplug::api::{BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use meshlink_core::{Device, DiscoveryEvent, TransportKind};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;
use crate::protocol::{fallback_name, is_mesh_radio, MESH_SERVICE_UUID};
use crate::registry::PeripheralRegistry;

pub(crate) type SharedRegistry = Arc<Mutex<PeripheralRegistry<Peripheral>>>;

pub(crate) fn lock_registry(registry: &SharedRegistry) -> MutexGuard<'_, PeripheralRegistry<Peripheral>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Adapter
// ----------------------------------------------------------------------------

/// First BLE adapter reported by the platform
pub(crate) async fn default_adapter() -> Result<Adapter, BleTransportError> {
    let manager = Manager::new()
        .await
        .map_err(|e| BleTransportError::AdapterFailed(format!("Failed to create BLE manager: {}", e)))?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|e| BleTransportError::AdapterFailed(format!("Failed to get BLE adapters: {}", e)))?;

    let adapter = adapters
        .into_iter()
        .next()
        .ok_or(BleTransportError::AdapterNotAvailable)?;
    info!("BLE adapter initialized");
    Ok(adapter)
}

/// Stops the platform scan when the scan task ends or is aborted
struct ScanGuard {
    adapter: Adapter,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let adapter = self.adapter.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("Failed to stop BLE scan: {}", e);
                } else {
                    info!("Stopped BLE scanning");
                }
            });
        }
    }
}

// ----------------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------------

/// Scan until the receiver goes away, the adapter stops reporting, or the
/// configured scan timeout passes
pub(crate) async fn run_scan(
    adapter: Adapter,
    config: BleTransportConfig,
    registry: SharedRegistry,
    tx: mpsc::Sender<DiscoveryEvent>,
) -> Result<(), BleTransportError> {
    let mut central_events = adapter
        .events()
        .await
        .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;

    adapter
        .start_scan(ScanFilter {
            services: vec![MESH_SERVICE_UUID],
        })
        .await
        .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;
    let _guard = ScanGuard {
        adapter: adapter.clone(),
    };
    info!("Started BLE scanning for mesh radios");

    let mut sweep = tokio::time::interval(sweep_period(config.stale_after));
    let deadline = async {
        match config.scan_timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => futures::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        let events = tokio::select! {
            event = central_events.next() => match event {
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    observe(&adapter, &id, &config, &registry).await.into_iter().collect()
                }
                Some(_) => Vec::new(),
                None => {
                    debug!("BLE adapter event stream ended");
                    return Ok(());
                }
            },
            _ = sweep.tick() => {
                let lost = lock_registry(&registry).sweep(std::time::Instant::now(), config.stale_after);
                lost
            }
            _ = &mut deadline => {
                debug!("BLE scan timeout reached");
                return Ok(());
            }
        };

        for event in events {
            trace!("BLE discovery: {:?}", event);
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Stable id for a peripheral; platforms that hide the address fall back to
/// the opaque platform id
fn device_id_for(peripheral: &Peripheral) -> String {
    let address = peripheral.address();
    if address != BDAddr::default() {
        address.to_string()
    } else {
        format!("{:?}", peripheral.id())
    }
}

fn sweep_period(stale_after: Duration) -> Duration {
    (stale_after / 2).max(Duration::from_secs(1))
}

async fn observe(
    adapter: &Adapter,
    id: &PeripheralId,
    config: &BleTransportConfig,
    registry: &SharedRegistry,
) -> Option<DiscoveryEvent> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read BLE properties: {}", e);
            return None;
        }
    };

    if !is_mesh_radio(
        properties.local_name.as_deref(),
        &properties.services,
        config.name_prefix.as_deref(),
    ) {
        return None;
    }

    let device_id = device_id_for(&peripheral);
    let name = properties
        .local_name
        .unwrap_or_else(|| fallback_name(&device_id));
    let mut device = Device::new(device_id, name, TransportKind::Ble);
    device.rssi = properties.rssi;

    let event = lock_registry(registry).observe(device, peripheral, std::time::Instant::now());
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_period() {
        assert_eq!(sweep_period(Duration::from_secs(30)), Duration::from_secs(15));
        assert_eq!(sweep_period(Duration::from_millis(10)), Duration::from_secs(1));
    }
}
