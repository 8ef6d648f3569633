//! Command handlers for the MeshLink CLI

use std::time::Duration;

use meshlink_core::{Device, DeviceId, NodeNum};
use meshlink_runtime::{ConnectionManager, ManagerEvent};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::app::{wait_for_device, wait_until_subscribed, MeshApp};
use crate::cli::Commands;
use crate::error::{CliError, Result};

/// How long a named device may take to show up in discovery
const DEVICE_WAIT: Duration = Duration::from_secs(30);

/// Upper bound on connect, handshake and node database download
const SUBSCRIBE_WAIT: Duration = Duration::from_secs(120);

/// Grace period after a send so the device can accept the frame
const SEND_SETTLE: Duration = Duration::from_secs(2);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, app: MeshApp) -> Result<()> {
        match command {
            Commands::Scan { duration, json } => {
                Self::handle_scan_command(&app, Duration::from_secs(duration), json).await
            }
            Commands::Connect { device, duration } => {
                Self::handle_connect_command(&app, device, duration.map(Duration::from_secs)).await
            }
            Commands::Monitor => Self::handle_monitor_command(&app).await,
            Commands::Send {
                device,
                text,
                to,
                channel,
            } => Self::handle_send_command(&app, device, text, to, channel).await,
        }
    }

    /// Scan for a while, then print what was found
    async fn handle_scan_command(app: &MeshApp, duration: Duration, json: bool) -> Result<()> {
        let manager = app.start(app.config().manager_config().with_auto_connect(false));
        info!("Scanning for {} seconds...", duration.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = tokio::signal::ctrl_c() => info!("Scan interrupted"),
        }

        let mut devices = manager.devices();
        manager.shutdown().await?;
        devices.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.id.cmp(&b.id)));

        if json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else {
            print_devices(&devices);
        }
        Ok(())
    }

    /// Connect to one device and log traffic until told to stop
    async fn handle_connect_command(
        app: &MeshApp,
        device: String,
        duration: Option<Duration>,
    ) -> Result<()> {
        let device = DeviceId::new(device);
        let manager = app.start(app.config().manager_config().with_auto_connect(false));
        let result = async {
            let events = connect(&manager, &device).await?;
            print_status(&manager);
            run_until_stopped(&manager, events, duration).await;
            Ok::<(), CliError>(())
        }
        .await;

        manager.shutdown().await?;
        result
    }

    /// Stay attached to the preferred device, reconnecting as needed
    async fn handle_monitor_command(app: &MeshApp) -> Result<()> {
        let preferred = app
            .config()
            .preferences
            .preferred_device
            .clone()
            .ok_or_else(|| {
                CliError::Config("monitor needs preferences.preferred_device".to_string())
            })?;
        info!("Monitoring {}. Press Ctrl+C to stop", preferred);

        let manager = app.start(app.config().manager_config().with_auto_connect(true));
        let events = manager.subscribe();
        run_until_stopped(&manager, events, None).await;
        manager.shutdown().await?;
        Ok(())
    }

    /// Send one text message and exit
    async fn handle_send_command(
        app: &MeshApp,
        device: String,
        text: String,
        to: Option<String>,
        channel: u8,
    ) -> Result<()> {
        let destination = match to {
            Some(node) => node.parse::<NodeNum>()?,
            None => NodeNum::BROADCAST,
        };
        let device = DeviceId::new(device);
        let manager = app.start(app.config().manager_config().with_auto_connect(false));

        let result = async {
            connect(&manager, &device).await?;
            manager.send_text(destination, channel, &text).await?;
            if destination.is_broadcast() {
                println!("Message broadcast on channel {}", channel);
            } else {
                println!("Message sent to {} on channel {}", destination, channel);
            }
            tokio::time::sleep(SEND_SETTLE).await;
            Ok::<(), CliError>(())
        }
        .await;

        manager.shutdown().await?;
        result
    }
}

/// Wait for `device` to be discovered, connect, and wait for the handshake
async fn connect(
    manager: &ConnectionManager,
    device: &DeviceId,
) -> Result<broadcast::Receiver<ManagerEvent>> {
    info!("Waiting for {} to be discovered...", device);
    wait_for_device(manager, device, DEVICE_WAIT).await?;

    let mut events = manager.subscribe();
    manager.connect(device.clone()).await?;
    wait_until_subscribed(&mut events, SUBSCRIBE_WAIT).await?;
    info!("Connected to {}", device);
    Ok(events)
}

/// Log manager events until Ctrl+C or `duration` elapses
async fn run_until_stopped(
    manager: &ConnectionManager,
    mut events: broadcast::Receiver<ManagerEvent>,
    duration: Option<Duration>,
) {
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ManagerEvent::StateChanged(state)) => info!("State: {}", state),
                Ok(ManagerEvent::ConnectionError(error)) => warn!("Connection error: {}", error),
                Ok(ManagerEvent::Subscribed { device, node }) => match node {
                    Some(node) => info!("Subscribed to {} as {}", device, node),
                    None => info!("Subscribed to {}", device),
                },
                Ok(ManagerEvent::Disconnected { device }) => info!("Disconnected from {}", device),
                Ok(ManagerEvent::DevicesChanged) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Missed {} manager events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping...");
                break;
            }
        }
    }
    print_status(manager);
}

fn print_status(manager: &ConnectionManager) {
    let snapshot = manager.snapshot();
    println!("State:           {}", snapshot.state);
    if let Some(device) = &snapshot.active_device {
        println!("Device:          {}", device);
    }
    if let Some(node) = snapshot.active_node_num {
        println!("Node:            {}", node);
    }
    println!("Frames sent:     {}", snapshot.frames_sent);
    println!("Frames received: {}", snapshot.frames_received);
    if let Some(error) = &snapshot.last_error {
        println!("Last error:      {}", error);
    }
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No devices found");
        return;
    }
    println!("{:<40} {:<24} {:<7} {:>6}", "ID", "NAME", "VIA", "RSSI");
    for device in devices {
        let rssi = device
            .rssi
            .map(|rssi| rssi.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:<24} {:<7} {:>6}",
            device.id.to_string(),
            device.name,
            device.transport.to_string(),
            rssi
        );
    }
}
