//! GATT service layout of a mesh radio

use uuid::Uuid;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Mesh radio API service
pub const MESH_SERVICE_UUID: Uuid = Uuid::from_u128(0x6ba1b218_15a8_461f_9fa8_5dcae273eafd);

/// Client writes encoded `ToRadio` frames here
pub const TO_RADIO_UUID: Uuid = Uuid::from_u128(0xf75c76d2_129e_4dad_a1dd_7866124401e7);

/// Client reads queued `FromRadio` frames here until an empty value comes back
pub const FROM_RADIO_UUID: Uuid = Uuid::from_u128(0x2c55e69e_4993_11ed_b878_0242ac120002);

/// Notifies when new frames are waiting in `FromRadio`
pub const FROM_NUM_UUID: Uuid = Uuid::from_u128(0xed9da18c_a800_4f66_a670_aa7547e34453);

/// Notifies device log lines (newer firmware only)
pub const LOG_RADIO_UUID: Uuid = Uuid::from_u128(0x5a3d6e49_06e6_4423_9944_e9de8cdf9547);

// ----------------------------------------------------------------------------
// Protocol Utilities
// ----------------------------------------------------------------------------

/// Whether an advertisement belongs to a mesh radio worth listing
///
/// Platforms that ignore the scan filter still report other peripherals, so
/// the service list is checked again here.
pub fn is_mesh_radio(name: Option<&str>, services: &[Uuid], name_prefix: Option<&str>) -> bool {
    if !services.contains(&MESH_SERVICE_UUID) {
        return false;
    }
    match (name_prefix, name) {
        (None, _) => true,
        (Some(prefix), Some(name)) => name.starts_with(prefix),
        (Some(_), None) => false,
    }
}

/// Display name for a peripheral that advertised none
pub fn fallback_name(device_id: &str) -> String {
    let tail: String = device_id
        .chars()
        .rev()
        .filter(|c| c.is_ascii_hexdigit())
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if tail.is_empty() {
        "Mesh radio".to_string()
    } else {
        format!("Mesh radio {}", tail.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_strings() {
        assert_eq!(
            MESH_SERVICE_UUID.to_string(),
            "6ba1b218-15a8-461f-9fa8-5dcae273eafd"
        );
        assert_eq!(FROM_RADIO_UUID.to_string(), "2c55e69e-4993-11ed-b878-0242ac120002");
        assert_eq!(LOG_RADIO_UUID.to_string(), "5a3d6e49-06e6-4423-9944-e9de8cdf9547");
    }

    #[test]
    fn test_is_mesh_radio() {
        let services = [MESH_SERVICE_UUID];
        assert!(is_mesh_radio(Some("Meshtastic_1a2b"), &services, None));
        assert!(is_mesh_radio(Some("Meshtastic_1a2b"), &services, Some("Mesh")));
        assert!(!is_mesh_radio(Some("Heart Rate"), &services, Some("Mesh")));
        assert!(!is_mesh_radio(None, &services, Some("Mesh")));
        assert!(!is_mesh_radio(Some("Meshtastic_1a2b"), &[], None));
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(fallback_name("E4:5F:01:AA:1B:2C"), "Mesh radio 1b2c");
        assert_eq!(fallback_name("--"), "Mesh radio");
    }
}
