//! Turns periodic "what is reachable now" polls into discovery events

use std::collections::BTreeMap;

use meshlink_core::{Device, DeviceId, DiscoveryEvent};

/// Devices seen by the previous poll
#[derive(Debug, Default)]
pub struct PresenceTracker {
    present: BTreeMap<DeviceId, Device>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against the previous poll
    ///
    /// New devices are `Found`, devices whose name changed are `Updated`,
    /// and devices missing from `current` are `Lost`.
    pub fn update(&mut self, current: Vec<Device>) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();
        let mut next = BTreeMap::new();

        for device in current {
            match self.present.remove(&device.id) {
                None => events.push(DiscoveryEvent::Found(device.clone())),
                Some(previous) if previous.name != device.name => {
                    events.push(DiscoveryEvent::Updated(device.clone()))
                }
                Some(_) => {}
            }
            next.insert(device.id.clone(), device);
        }

        events.extend(
            std::mem::take(&mut self.present)
                .into_keys()
                .map(DiscoveryEvent::Lost),
        );
        self.present = next;
        events
    }

    pub fn is_present(&self, id: &DeviceId) -> bool {
        self.present.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::TransportKind;

    fn port(id: &str, name: &str) -> Device {
        Device::new(id, name, TransportKind::Serial)
    }

    #[test]
    fn test_found_updated_lost() {
        let mut tracker = PresenceTracker::new();

        let events = tracker.update(vec![port("/dev/ttyUSB0", "T-Beam"), port("/dev/ttyACM0", "RAK")]);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, DiscoveryEvent::Found(_))));

        // unchanged devices produce nothing
        assert!(tracker
            .update(vec![port("/dev/ttyUSB0", "T-Beam"), port("/dev/ttyACM0", "RAK")])
            .is_empty());

        let events = tracker.update(vec![port("/dev/ttyUSB0", "T-Beam Supreme")]);
        assert_eq!(
            events,
            vec![
                DiscoveryEvent::Updated(port("/dev/ttyUSB0", "T-Beam Supreme")),
                DiscoveryEvent::Lost(DeviceId::new("/dev/ttyACM0")),
            ]
        );
        assert!(tracker.is_present(&DeviceId::new("/dev/ttyUSB0")));
        assert!(!tracker.is_present(&DeviceId::new("/dev/ttyACM0")));
    }
}
