//! End-to-end tests of the connection manager against the mock transport

use std::time::Duration;

use meshlink_core::{
    ConnectionEvent, DeviceId, DeviceState, FirmwareVersion, FromRadio, ManagerConfig, MeshError,
    MeshPacket, NodeNum, PortNum, RetryConfig, ToRadio,
};
use meshlink_harness::{node_info, DisconnectRecord, MockTransport, RadioScript};
use meshlink_runtime::{
    ConnectionManager, ConnectionManagerBuilder, ConnectionManagerState as State, ManagerEvent,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const RADIO: &str = "radio-1";

fn config() -> ManagerConfig {
    ManagerConfig::new()
        .with_retry(RetryConfig::immediate(3))
        .with_preferred_device(RADIO)
        .with_auto_connect(true)
}

fn start(transport: &MockTransport) -> (ConnectionManager, broadcast::Receiver<ManagerEvent>) {
    let manager = ConnectionManagerBuilder::new()
        .with_config(config())
        .add_transport(transport.clone())
        .build();
    let events = manager.subscribe();
    (manager, events)
}

/// Collect state transitions until `until` is reached
async fn states_until(
    events: &mut broadcast::Receiver<ManagerEvent>,
    until: State,
) -> Vec<State> {
    let mut states = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("timed out waiting for state")
            .expect("event channel closed");
        if let ManagerEvent::StateChanged(state) = event {
            states.push(state);
            if state == until {
                return states;
            }
        }
    }
}

/// Wait until the radio has been sent a frame matching `pred`
async fn sent(transport: &MockTransport, pred: impl Fn(&ToRadio) -> bool) {
    timeout(Duration::from_secs(600), async {
        while !transport.sent_frames().iter().any(&pred) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("frame never sent");
}

fn is_config_request(frame: &ToRadio) -> bool {
    matches!(frame, ToRadio::WantConfig { nonce } if *nonce == meshlink_core::WANT_CONFIG_NONCE)
}

fn is_database_request(frame: &ToRadio) -> bool {
    matches!(frame, ToRadio::WantConfig { nonce } if *nonce == meshlink_core::WANT_DATABASE_NONCE)
}

async fn subscribed(transport: &MockTransport) -> (ConnectionManager, broadcast::Receiver<ManagerEvent>) {
    let (manager, mut events) = start(transport);
    transport.announce(transport.device(RADIO, "Base Station"));
    states_until(&mut events, State::Subscribed).await;
    (manager, events)
}

// ----------------------------------------------------------------------------
// Scenario 1: happy path
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_preferred_device_reaches_subscribed() {
    let transport = MockTransport::ble().with_script(RadioScript::new().with_nodes(2));
    let (manager, mut events) = start(&transport);
    assert_eq!(manager.state(), State::Discovering);

    transport.announce(transport.device(RADIO, "Base Station"));
    let states = states_until(&mut events, State::Subscribed).await;

    assert_eq!(
        states,
        vec![
            State::Connecting,
            State::Communicating,
            State::RetrievingDatabase { node_count: 0 },
            State::RetrievingDatabase { node_count: 1 },
            State::Subscribed,
        ]
    );
    assert_eq!(manager.wait_for_database_ready().await, Ok(()));
    assert!(manager.is_connected());

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.active_node_num, Some(NodeNum(0x1234_abcd)));
    let device = snapshot.active().expect("active device");
    assert_eq!(device.state, DeviceState::Connected);
    assert_eq!(device.num, Some(NodeNum(0x1234_abcd)));
    assert_eq!(device.firmware, Some(FirmwareVersion::new(2, 7, 15)));
    assert_eq!(transport.open_count(), 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_database_completion_before_entries() {
    let transport = MockTransport::ble().with_script(
        RadioScript::new()
            .with_nodes(2)
            .with_database_complete_first(),
    );
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Base Station"));

    let states = states_until(&mut events, State::Subscribed).await;
    assert_eq!(
        states,
        vec![State::Connecting, State::Communicating, State::Subscribed]
    );
    assert_eq!(manager.wait_for_database_ready().await, Ok(()));
}

#[tokio::test]
async fn test_empty_database() {
    let transport = MockTransport::ble();
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Base Station"));

    let states = states_until(&mut events, State::Subscribed).await;
    assert_eq!(
        states,
        vec![State::Connecting, State::Communicating, State::Subscribed]
    );
    assert!(manager.is_connected());
}

// ----------------------------------------------------------------------------
// Scenario 2: recoverable error mid-handshake
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_transient_error_retries_step() {
    let transport = MockTransport::ble().with_script(
        RadioScript::new()
            .with_nodes(1)
            .with_transient_config_errors(1),
    );
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Base Station"));

    let states = states_until(&mut events, State::Subscribed).await;
    assert_eq!(
        states,
        vec![
            State::Connecting,
            State::Retrying { attempt: 1 },
            State::Communicating,
            State::RetrievingDatabase { node_count: 0 },
            State::Subscribed,
        ]
    );
    // the session was kept; only the step was re-run
    assert_eq!(transport.open_count(), 1);
    let config_requests = transport
        .sent_frames()
        .iter()
        .filter(|f| matches!(f, ToRadio::WantConfig { nonce } if *nonce == meshlink_core::WANT_CONFIG_NONCE))
        .count();
    assert_eq!(config_requests, 2);
    assert_eq!(manager.last_error(), None);
}

#[tokio::test]
async fn test_error_during_database_download_requests_it_again() {
    let transport = MockTransport::ble().with_script(RadioScript::new().with_nodes(2));
    transport.script(|s| s.answer_database = false);
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Base Station"));

    states_until(&mut events, State::Communicating).await;
    sent(&transport, is_database_request).await;

    // first entry arrives, then the link glitches before the rest
    assert!(transport.inject_frame(FromRadio::NodeInfo(node_info(1))));
    states_until(&mut events, State::RetrievingDatabase { node_count: 0 }).await;
    transport.script(|s| s.answer_database = true);
    assert!(transport.inject(ConnectionEvent::Error {
        error: MeshError::io_failed("link glitch"),
        reconnectable: true,
    }));

    let states = states_until(&mut events, State::Subscribed).await;
    assert_eq!(
        states,
        vec![
            State::Retrying { attempt: 1 },
            State::RetrievingDatabase { node_count: 0 },
            State::RetrievingDatabase { node_count: 1 },
            State::Subscribed,
        ]
    );
    let database_requests = transport
        .sent_frames()
        .iter()
        .filter(|f| is_database_request(f))
        .count();
    assert_eq!(database_requests, 2);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.wait_for_database_ready().await, Ok(()));
    assert_eq!(manager.last_error(), None);
}

#[tokio::test]
async fn test_fatal_error_mid_handshake_suppresses_auto_connect() {
    let transport = MockTransport::ble();
    transport.script(|s| s.answer_config = false);
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Base Station"));

    states_until(&mut events, State::Connecting).await;
    sent(&transport, is_config_request).await;
    assert!(transport.inject(ConnectionEvent::Error {
        error: MeshError::io_failed("adapter removed"),
        reconnectable: false,
    }));

    let states = states_until(&mut events, State::Discovering).await;
    assert_eq!(states, vec![State::Discovering]);
    assert_eq!(
        manager.last_error(),
        Some(MeshError::io_failed("adapter removed"))
    );
    assert_eq!(transport.disconnects().len(), 1);
    assert!(!transport.disconnects()[0].should_reconnect);

    transport.script(|s| s.answer_config = true);
    transport.announce(transport.device(RADIO, "Base Station (again)"));
    manager
        .wait_for(|s| {
            s.device(&DeviceId::new(RADIO))
                .is_some_and(|d| d.name == "Base Station (again)")
        })
        .await
        .unwrap();
    assert_eq!(manager.state(), State::Discovering);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_return_to_discovery() {
    let transport = MockTransport::ble();
    transport.fail_next_opens(3);
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Base Station"));

    let states = states_until(&mut events, State::Discovering).await;
    assert_eq!(
        states,
        vec![
            State::Connecting,
            State::Retrying { attempt: 1 },
            State::Retrying { attempt: 2 },
            State::Discovering,
        ]
    );
    assert!(matches!(
        manager.last_error(),
        Some(MeshError::TooManyRetries { attempts: 3, .. })
    ));

    // auto-connect stays off until an explicit connect
    transport.announce(transport.device(RADIO, "Base Station (again)"));
    manager
        .wait_for(|s| {
            s.device(&DeviceId::new(RADIO))
                .is_some_and(|d| d.name == "Base Station (again)")
        })
        .await
        .unwrap();
    assert_eq!(manager.state(), State::Discovering);
    assert_eq!(transport.open_count(), 3);

    manager.connect(RADIO).await.unwrap();
    states_until(&mut events, State::Subscribed).await;
    assert_eq!(transport.open_count(), 4);
}

#[tokio::test]
async fn test_old_firmware_is_rejected() {
    let transport =
        MockTransport::ble().with_script(RadioScript::new().with_firmware("2.1.9.abcdef"));
    let (manager, mut events) = start(&transport);
    transport.announce(transport.device(RADIO, "Old Radio"));

    let states = states_until(&mut events, State::Discovering).await;
    assert_eq!(states, vec![State::Connecting, State::Discovering]);
    assert!(matches!(
        manager.last_error(),
        Some(MeshError::VersionMismatch { .. })
    ));
    assert_eq!(transport.disconnects().len(), 1);
    assert!(!transport.disconnects()[0].should_reconnect);
}

// ----------------------------------------------------------------------------
// Scenario 3: peer disconnect while subscribed
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_peer_disconnect_suppresses_auto_reconnect() {
    let transport = MockTransport::ble().with_script(RadioScript::new().with_nodes(1));
    let (manager, mut events) = subscribed(&transport).await;

    assert!(transport.inject(ConnectionEvent::Disconnected));
    let states = states_until(&mut events, State::Discovering).await;
    assert_eq!(states, vec![State::Discovering]);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.active_device, None);
    assert_eq!(snapshot.active_node_num, None);
    assert_eq!(
        snapshot.device(&DeviceId::new(RADIO)).map(|d| d.state),
        Some(DeviceState::Disconnected)
    );
    assert_eq!(
        manager.wait_for_database_ready().await,
        Err(MeshError::Cancelled)
    );

    transport.announce(transport.device(RADIO, "Base Station v2"));
    manager
        .wait_for(|s| {
            s.device(&DeviceId::new(RADIO))
                .is_some_and(|d| d.name == "Base Station v2")
        })
        .await
        .unwrap();
    assert_eq!(manager.state(), State::Discovering);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_user_disconnect() {
    let transport = MockTransport::ble();
    let (manager, mut events) = subscribed(&transport).await;

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), State::Discovering);
    assert_eq!(
        transport.disconnects(),
        vec![DisconnectRecord {
            device: DeviceId::new(RADIO),
            reason: "user requested".into(),
            should_reconnect: false,
        }]
    );
    assert_eq!(states_until(&mut events, State::Discovering).await, vec![State::Discovering]);
}

#[tokio::test]
async fn test_fatal_error_while_subscribed() {
    let transport = MockTransport::ble();
    let (manager, mut events) = subscribed(&transport).await;

    transport.inject(ConnectionEvent::Error {
        error: MeshError::io_failed("adapter removed"),
        reconnectable: false,
    });
    states_until(&mut events, State::Discovering).await;
    assert_eq!(
        manager.last_error(),
        Some(MeshError::io_failed("adapter removed"))
    );
}

#[tokio::test]
async fn test_recoverable_error_while_subscribed_reconnects_preferred() {
    let transport = MockTransport::ble().with_script(RadioScript::new().with_nodes(1));
    let (manager, mut events) = subscribed(&transport).await;

    assert!(transport.inject(ConnectionEvent::Error {
        error: MeshError::disconnected("radio rebooted"),
        reconnectable: true,
    }));

    // the radio never left discovery, so no new scan event arrives
    let states = states_until(&mut events, State::Subscribed).await;
    assert_eq!(
        states,
        vec![
            State::Discovering,
            State::Connecting,
            State::Communicating,
            State::RetrievingDatabase { node_count: 0 },
            State::Subscribed,
        ]
    );
    assert_eq!(transport.open_count(), 2);
    assert_eq!(
        transport.disconnects(),
        vec![DisconnectRecord {
            device: DeviceId::new(RADIO),
            reason: "connection error".into(),
            should_reconnect: false,
        }]
    );
    assert!(manager.is_connected());
}

// ----------------------------------------------------------------------------
// Scenario 4: liveness failure
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_reconnects_same_device() {
    let transport = MockTransport::ble().with_script(RadioScript::new().with_nodes(1));
    let (manager, mut events) = subscribed(&transport).await;

    transport.script(|s| s.answer_heartbeats = false);

    let mut saw_timeout = false;
    let mut states = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("timed out")
            .expect("closed");
        match event {
            ManagerEvent::ConnectionError(MeshError::Timeout { .. }) => saw_timeout = true,
            ManagerEvent::StateChanged(state) => {
                states.push(state);
                if state == State::Subscribed {
                    break;
                }
            }
            _ => {}
        }
    }

    assert!(saw_timeout);
    // reconnecting never passes through discovery
    assert_eq!(
        states,
        vec![
            State::Connecting,
            State::Communicating,
            State::RetrievingDatabase { node_count: 0 },
            State::Subscribed,
        ]
    );
    assert_eq!(
        transport.disconnects(),
        vec![DisconnectRecord {
            device: DeviceId::new(RADIO),
            reason: "heartbeat timeout".into(),
            should_reconnect: true,
        }]
    );
    assert_eq!(transport.open_count(), 2);
    assert!(transport.heartbeats_sent() >= 1);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_failed_heartbeat_send_reconnects() {
    let transport = MockTransport::ble().with_script(RadioScript::new().with_nodes(1));
    let (manager, mut events) = subscribed(&transport).await;

    transport.script(|s| s.send_failures = 1);

    let mut saw_write_error = false;
    let mut states = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("timed out")
            .expect("closed");
        match event {
            ManagerEvent::ConnectionError(MeshError::IoFailed { .. }) => saw_write_error = true,
            ManagerEvent::StateChanged(state) => {
                states.push(state);
                if state == State::Subscribed {
                    break;
                }
            }
            _ => {}
        }
    }

    assert!(saw_write_error);
    assert_eq!(
        states,
        vec![
            State::Connecting,
            State::Communicating,
            State::RetrievingDatabase { node_count: 0 },
            State::Subscribed,
        ]
    );
    assert_eq!(
        transport.disconnects(),
        vec![DisconnectRecord {
            device: DeviceId::new(RADIO),
            reason: "heartbeat send failed".into(),
            should_reconnect: true,
        }]
    );
    assert_eq!(transport.open_count(), 2);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_old_firmware_heartbeat_never_times_out() {
    let transport = MockTransport::ble().with_script(
        RadioScript::new()
            .with_firmware("2.5.0")
            .with_silent_heartbeats(),
    );
    let (manager, _) = subscribed(&transport).await;
    let mut events = manager.subscribe();

    // several probe intervals pass without a reply
    assert!(timeout(Duration::from_secs(300), events.recv()).await.is_err());
    assert!(transport.heartbeats_sent() >= 4);
    assert_eq!(manager.state(), State::Subscribed);
    assert!(transport.disconnects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_inbound_traffic_defers_heartbeat() {
    let transport = MockTransport::ble();
    let (_manager, _events) = subscribed(&transport).await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(40)).await;
        transport.inject(ConnectionEvent::LogLine("tick".into()));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.heartbeats_sent(), 0);
}

// ----------------------------------------------------------------------------
// Manager operations
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_close_connection_is_idempotent() {
    let transport = MockTransport::ble();
    let (manager, mut events) = subscribed(&transport).await;

    manager.close_connection().await.unwrap();
    manager.close_connection().await.unwrap();
    assert_eq!(manager.state(), State::Discovering);

    let mut disconnected = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ManagerEvent::Disconnected { .. }) {
            disconnected += 1;
        }
    }
    assert_eq!(disconnected, 1);
}

#[tokio::test]
async fn test_connect_requires_known_device() {
    let transport = MockTransport::ble();
    let manager = ConnectionManagerBuilder::new()
        .add_transport(transport.clone())
        .build();

    assert!(matches!(
        manager.connect("nowhere").await,
        Err(MeshError::DiscoveryFailed { .. })
    ));
}

#[tokio::test]
async fn test_connect_to_second_device_fails_fast() {
    let transport = MockTransport::ble();
    let (manager, _events) = subscribed(&transport).await;
    transport.announce(transport.device("radio-2", "Other"));
    manager
        .wait_for(|s| s.devices.len() == 2)
        .await
        .unwrap();

    assert!(matches!(
        manager.connect("radio-2").await,
        Err(MeshError::ConnectionFailed { .. })
    ));
    assert_eq!(manager.connect(RADIO).await, Ok(()));
    assert_eq!(manager.state(), State::Subscribed);
}

#[tokio::test]
async fn test_explicit_connect_without_auto_connect() {
    let transport = MockTransport::ble();
    let manager = ConnectionManagerBuilder::new()
        .with_config(ManagerConfig::new().with_retry(RetryConfig::immediate(3)))
        .add_transport(transport.clone())
        .build();
    let mut events = manager.subscribe();

    transport.announce(transport.device(RADIO, "Base Station"));
    manager.wait_for(|s| s.devices.len() == 1).await.unwrap();
    assert_eq!(manager.state(), State::Discovering);

    manager.connect(RADIO).await.unwrap();
    states_until(&mut events, State::Subscribed).await;
}

#[tokio::test]
async fn test_send_requires_connection() {
    let transport = MockTransport::ble();
    let manager = ConnectionManagerBuilder::new()
        .add_transport(transport.clone())
        .build();

    assert!(matches!(
        manager.send_text(NodeNum::BROADCAST, 0, "hello").await,
        Err(MeshError::ConnectionFailed { .. })
    ));
}

#[tokio::test]
async fn test_send_counts_frames() {
    let transport = MockTransport::ble();
    let (manager, _events) = subscribed(&transport).await;
    let before = manager.snapshot().frames_sent;

    manager
        .send_text(NodeNum(0x42), 1, "hello mesh")
        .await
        .unwrap();

    assert_eq!(manager.snapshot().frames_sent, before + 1);
    let Some(ToRadio::Packet(packet)) = transport.sent_frames().last().cloned() else {
        panic!("expected a packet");
    };
    assert_eq!(packet.payload, b"hello mesh");
    assert_eq!(packet.channel, 1);
    assert!(packet.want_ack);
}

#[tokio::test]
async fn test_frames_dispatched_by_port() {
    let transport = MockTransport::ble();
    let (text_tx, mut text_rx) = mpsc::unbounded_channel();
    let (other_tx, mut other_rx) = mpsc::unbounded_channel();

    let manager = ConnectionManagerBuilder::new()
        .with_config(config())
        .add_transport(transport.clone())
        .on_port(PortNum::TextMessage, move |frame: &FromRadio| {
            let _ = text_tx.send(frame.clone());
        })
        .fallback_handler(move |frame: &FromRadio| {
            let _ = other_tx.send(frame.kind());
        })
        .build();
    let mut events = manager.subscribe();
    transport.announce(transport.device(RADIO, "Base Station"));
    states_until(&mut events, State::Subscribed).await;

    let mut packet = MeshPacket::text(NodeNum::BROADCAST, "hi all");
    packet.from = NodeNum(7);
    transport.inject_frame(FromRadio::Packet(packet.clone()));

    assert_eq!(text_rx.recv().await, Some(FromRadio::Packet(packet)));
    // handshake frames went to the fallback, completion markers did not
    let mut kinds = Vec::new();
    while let Ok(kind) = other_rx.try_recv() {
        kinds.push(kind);
    }
    assert!(kinds.contains(&meshlink_core::FrameKind::MyInfo));
    assert!(!kinds.contains(&meshlink_core::FrameKind::ConfigComplete));
}

#[tokio::test]
async fn test_stop_discovery_clears_devices() {
    let transport = MockTransport::ble();
    let manager = ConnectionManagerBuilder::new()
        .add_transport(transport.clone())
        .build();

    transport.announce(transport.device("a", "Alpha"));
    transport.announce(transport.device("b", "Bravo"));
    manager.wait_for(|s| s.devices.len() == 2).await.unwrap();

    // idempotent
    manager.start_discovery().await.unwrap();
    assert_eq!(manager.devices().len(), 2);

    manager.stop_discovery().await.unwrap();
    assert!(manager.devices().is_empty());
    assert_eq!(manager.state(), State::Idle);
    assert!(!manager.snapshot().discovering);
}

#[tokio::test]
async fn test_lost_and_signal_events() {
    let transport = MockTransport::ble();
    let manager = ConnectionManagerBuilder::new()
        .add_transport(transport.clone())
        .build();

    transport.announce(transport.device("a", "Alpha"));
    transport.signal(&DeviceId::new("a"), -90);
    manager
        .wait_for(|s| s.device(&DeviceId::new("a")).is_some_and(|d| d.rssi == Some(-90)))
        .await
        .unwrap();

    transport.lose(&DeviceId::new("a"));
    manager.wait_for(|s| s.devices.is_empty()).await.unwrap();
}

#[tokio::test]
async fn test_suspend_and_resume_reach_connection() {
    let transport = MockTransport::ble();
    let (manager, _events) = subscribed(&transport).await;

    manager.suspend().await.unwrap();
    assert!(manager.snapshot().suspended);
    manager.resume().await.unwrap();
    assert!(!manager.snapshot().suspended);

    assert_eq!(transport.suspend_count(), 1);
    assert_eq!(transport.resume_count(), 1);
}

#[tokio::test]
async fn test_shutdown_sends_disconnect() {
    let transport = MockTransport::ble();
    let (manager, _events) = subscribed(&transport).await;

    manager.shutdown().await.unwrap();
    assert!(transport
        .sent_frames()
        .iter()
        .any(|f| matches!(f, ToRadio::Disconnect)));
    assert_eq!(transport.disconnects().len(), 1);

    // the task is gone; further requests fail cleanly
    assert_eq!(manager.start_discovery().await, Err(MeshError::Cancelled));
    assert_eq!(manager.shutdown().await, Ok(()));
}
