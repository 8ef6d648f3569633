//! Discovery across several transports

use std::sync::Arc;

use futures::StreamExt;
use meshlink_core::{DeviceId, DiscoveryEvent, ManagerConfig, RetryConfig, Transport, TransportKind};
use meshlink_harness::MockTransport;
use meshlink_runtime::{ConnectionManagerBuilder, ConnectionManagerState, DiscoveryAggregator};

#[tokio::test]
async fn test_aggregator_merges_transports() {
    let ble = MockTransport::ble();
    let tcp = MockTransport::new(TransportKind::Tcp);
    ble.announce(ble.device("ble-1", "Pocket"));
    tcp.announce(tcp.device("192.168.1.20:4403", "Rooftop"));

    let aggregator = DiscoveryAggregator::new(vec![
        Arc::new(ble.clone()) as Arc<dyn Transport>,
        Arc::new(tcp.clone()),
    ]);
    let mut merged = aggregator.discover_all();

    let mut names = Vec::new();
    for _ in 0..2 {
        match merged.next().await {
            Some(DiscoveryEvent::Found(device)) => names.push(device.name),
            other => panic!("unexpected event {other:?}"),
        }
    }
    names.sort();
    assert_eq!(names, vec!["Pocket", "Rooftop"]);

    tcp.lose(&DeviceId::new("192.168.1.20:4403"));
    assert_eq!(
        merged.next().await,
        Some(DiscoveryEvent::Lost(DeviceId::new("192.168.1.20:4403")))
    );
}

#[tokio::test]
async fn test_aggregator_routes_by_kind() {
    let aggregator = DiscoveryAggregator::new(vec![Arc::new(MockTransport::ble()) as Arc<dyn Transport>]);

    assert!(aggregator.transport_for(TransportKind::Ble).is_some());
    assert!(aggregator.transport_for(TransportKind::Serial).is_none());
    assert!(!aggregator.is_empty());
    assert!(DiscoveryAggregator::default().is_empty());
}

#[tokio::test]
async fn test_manager_opens_through_owning_transport() {
    let ble = MockTransport::ble();
    let tcp = MockTransport::new(TransportKind::Tcp);
    let manager = ConnectionManagerBuilder::new()
        .with_config(
            ManagerConfig::new()
                .with_retry(RetryConfig::immediate(3))
                .with_preferred_device("10.0.0.5:4403")
                .with_auto_connect(true),
        )
        .add_transport(ble.clone())
        .add_transport(tcp.clone())
        .build();

    ble.announce(ble.device("ble-1", "Pocket"));
    tcp.announce(tcp.device("10.0.0.5:4403", "Rooftop"));

    let snapshot = manager
        .wait_for(|s| s.state == ConnectionManagerState::Subscribed && s.devices.len() == 2)
        .await
        .unwrap();
    assert_eq!(snapshot.active_device, Some(DeviceId::new("10.0.0.5:4403")));
    assert_eq!(tcp.open_count(), 1);
    assert_eq!(ble.open_count(), 0);
}
