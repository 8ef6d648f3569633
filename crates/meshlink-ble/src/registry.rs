//! Advertised peripherals and their freshness

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use meshlink_core::{Device, DeviceId, DiscoveryEvent};

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Seen<H> {
    device: Device,
    handle: H,
    last_seen: Instant,
}

/// Peripherals reported by the current scan, keyed by device id
///
/// `H` is the platform handle needed to open a session later. Devices with
/// a live session are pinned: they stop advertising while connected and must
/// not age out.
#[derive(Debug)]
pub struct PeripheralRegistry<H> {
    seen: HashMap<DeviceId, Seen<H>>,
    pinned: HashSet<DeviceId>,
}

impl<H> Default for PeripheralRegistry<H> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
            pinned: HashSet::new(),
        }
    }
}

impl<H: Clone> PeripheralRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advertisement and describe what changed
    pub fn observe(&mut self, device: Device, handle: H, now: Instant) -> Option<DiscoveryEvent> {
        match self.seen.get_mut(&device.id) {
            None => {
                self.seen.insert(
                    device.id.clone(),
                    Seen {
                        device: device.clone(),
                        handle,
                        last_seen: now,
                    },
                );
                Some(DiscoveryEvent::Found(device))
            }
            Some(entry) => {
                entry.last_seen = now;
                entry.handle = handle;
                let event = if entry.device.name != device.name {
                    Some(DiscoveryEvent::Updated(device.clone()))
                } else if device.rssi.is_some() && entry.device.rssi != device.rssi {
                    device.rssi.map(|rssi| DiscoveryEvent::Signal {
                        id: device.id.clone(),
                        rssi,
                    })
                } else {
                    None
                };
                entry.device = device;
                event
            }
        }
    }

    /// Drop unpinned devices not seen within `stale_after`
    pub fn sweep(&mut self, now: Instant, stale_after: Duration) -> Vec<DiscoveryEvent> {
        let stale: Vec<DeviceId> = self
            .seen
            .iter()
            .filter(|(id, seen)| {
                !self.pinned.contains(*id) && now.saturating_duration_since(seen.last_seen) > stale_after
            })
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .map(|id| {
                self.seen.remove(&id);
                DiscoveryEvent::Lost(id)
            })
            .collect()
    }

    pub fn handle(&self, id: &DeviceId) -> Option<H> {
        self.seen.get(id).map(|seen| seen.handle.clone())
    }

    pub fn pin(&mut self, id: &DeviceId) {
        self.pinned.insert(id.clone());
    }

    pub fn unpin(&mut self, id: &DeviceId) {
        self.pinned.remove(id);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::TransportKind;

    fn radio(id: &str, name: &str, rssi: i16) -> Device {
        Device::new(id, name, TransportKind::Ble).with_rssi(rssi)
    }

    #[test]
    fn test_observe_classifies_changes() {
        let mut registry = PeripheralRegistry::new();
        let t0 = Instant::now();

        assert!(matches!(
            registry.observe(radio("a", "Alpha", -60), 1u8, t0),
            Some(DiscoveryEvent::Found(_))
        ));
        assert_eq!(registry.observe(radio("a", "Alpha", -60), 1, t0), None);
        assert_eq!(
            registry.observe(radio("a", "Alpha", -72), 1, t0),
            Some(DiscoveryEvent::Signal {
                id: DeviceId::new("a"),
                rssi: -72
            })
        );
        assert!(matches!(
            registry.observe(radio("a", "Alpha 2", -72), 1, t0),
            Some(DiscoveryEvent::Updated(d)) if d.name == "Alpha 2"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_skips_pinned() {
        let mut registry = PeripheralRegistry::new();
        let t0 = Instant::now();
        registry.observe(radio("a", "Alpha", -60), (), t0);
        registry.observe(radio("b", "Bravo", -60), (), t0);
        registry.pin(&DeviceId::new("a"));

        let stale_after = Duration::from_secs(30);
        assert!(registry.sweep(t0 + Duration::from_secs(10), stale_after).is_empty());

        let lost = registry.sweep(t0 + Duration::from_secs(31), stale_after);
        assert_eq!(lost, vec![DiscoveryEvent::Lost(DeviceId::new("b"))]);
        assert!(registry.handle(&DeviceId::new("a")).is_some());

        registry.unpin(&DeviceId::new("a"));
        assert_eq!(registry.sweep(t0 + Duration::from_secs(31), stale_after).len(), 1);
        assert!(registry.is_empty());
    }
}
