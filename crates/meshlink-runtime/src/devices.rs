//! Known-device list maintained from discovery events

use meshlink_core::{Device, DeviceId, DiscoveryEvent};

/// Devices sorted by display name, unique by id
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    devices: Vec<Device>,
}

impl DeviceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one discovery event in; returns whether anything changed
    pub fn apply(&mut self, event: &DiscoveryEvent) -> bool {
        match event {
            DiscoveryEvent::Found(device) | DiscoveryEvent::Updated(device) => self.upsert(device),
            DiscoveryEvent::Lost(id) => self.remove(id).is_some(),
            DiscoveryEvent::Signal { id, rssi } => self.update_signal(id, *rssi),
        }
    }

    /// Insert or merge a discovered device, keeping session-owned fields
    pub fn upsert(&mut self, device: &Device) -> bool {
        match self.get_mut(&device.id) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge_discovery(device);
                let changed = *existing != before;
                if changed {
                    self.sort();
                }
                changed
            }
            None => {
                self.devices.push(device.clone());
                self.sort();
                true
            }
        }
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<Device> {
        let index = self.devices.iter().position(|d| &d.id == id)?;
        Some(self.devices.remove(index))
    }

    pub fn update_signal(&mut self, id: &DeviceId, rssi: i16) -> bool {
        match self.get_mut(id) {
            Some(device) if device.rssi != Some(rssi) => {
                device.rssi = Some(rssi);
                true
            }
            _ => false,
        }
    }

    /// Drop everything except `keep`
    pub fn retain_only(&mut self, keep: Option<&DeviceId>) {
        self.devices.retain(|d| Some(&d.id) == keep);
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| &d.id == id)
    }

    pub fn as_slice(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn sort(&mut self) {
        self.devices.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}
