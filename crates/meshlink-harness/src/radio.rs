//! Simulated radio
//!
//! A scripted device that answers `ToRadio` requests the way real firmware
//! does: configuration frames then a completion marker for the config nonce,
//! node entries and a completion marker for the database nonce, a queue
//! status for each heartbeat. Faults are injected by editing the script.

use meshlink_core::protocol::{
    ChannelInfo, ConfigEntry, DeviceMetadata, MyNodeInfo, NodeInfo, QueueStatus,
};
use meshlink_core::{FromRadio, MeshError, NodeNum, ToRadio, WANT_CONFIG_NONCE, WANT_DATABASE_NONCE};

/// What the radio does with one request
#[derive(Debug, Clone, PartialEq)]
pub enum RadioResponse {
    /// Frames pushed to the client, in order
    Frames(Vec<FromRadio>),
    /// The link reports a recoverable error instead of answering
    TransientError(MeshError),
    /// Silence
    Nothing,
}

#[derive(Debug, Clone)]
pub struct RadioScript {
    pub my_node_num: NodeNum,
    pub firmware: String,
    pub hw_model: String,
    pub config_sections: Vec<String>,
    pub channels: Vec<String>,
    pub node_db: Vec<NodeInfo>,
    /// Send the database completion marker before the entries
    pub database_complete_first: bool,
    pub answer_config: bool,
    pub answer_database: bool,
    pub answer_heartbeats: bool,
    /// Configuration requests to answer with a recoverable link error
    pub transient_config_errors: u32,
    /// Sends to reject outright with `IoFailed`
    pub send_failures: u32,
}

impl Default for RadioScript {
    fn default() -> Self {
        Self {
            my_node_num: NodeNum(0x1234_abcd),
            firmware: "2.7.15.567b8ea".into(),
            hw_model: "HELTEC_V3".into(),
            config_sections: vec!["device".into(), "lora".into(), "bluetooth".into()],
            channels: vec!["LongFast".into()],
            node_db: Vec::new(),
            database_complete_first: false,
            answer_config: true,
            answer_database: true,
            answer_heartbeats: true,
            transient_config_errors: 0,
            send_failures: 0,
        }
    }
}

impl RadioScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware = version.into();
        self
    }

    pub fn with_node_num(mut self, num: NodeNum) -> Self {
        self.my_node_num = num;
        self
    }

    /// Populate the node database with `count` generated entries
    pub fn with_nodes(mut self, count: u32) -> Self {
        self.node_db = (1..=count).map(node_info).collect();
        self
    }

    pub fn with_database_complete_first(mut self) -> Self {
        self.database_complete_first = true;
        self
    }

    pub fn with_silent_heartbeats(mut self) -> Self {
        self.answer_heartbeats = false;
        self
    }

    pub fn with_transient_config_errors(mut self, count: u32) -> Self {
        self.transient_config_errors = count;
        self
    }

    /// Answer one request, consuming any one-shot faults it triggers
    pub fn respond(&mut self, request: &ToRadio) -> RadioResponse {
        match request {
            ToRadio::WantConfig { nonce } if *nonce == WANT_CONFIG_NONCE => {
                if self.transient_config_errors > 0 {
                    self.transient_config_errors -= 1;
                    return RadioResponse::TransientError(MeshError::io_failed(
                        "simulated link glitch",
                    ));
                }
                if !self.answer_config {
                    return RadioResponse::Nothing;
                }
                let mut frames = self.config_frames();
                frames.push(FromRadio::ConfigComplete { nonce: *nonce });
                RadioResponse::Frames(frames)
            }
            ToRadio::WantConfig { nonce } if *nonce == WANT_DATABASE_NONCE => {
                if !self.answer_database {
                    return RadioResponse::Nothing;
                }
                let complete = FromRadio::ConfigComplete { nonce: *nonce };
                let entries = self.node_db.iter().cloned().map(FromRadio::NodeInfo);
                let frames = if self.database_complete_first {
                    std::iter::once(complete).chain(entries).collect()
                } else {
                    entries.chain(std::iter::once(complete)).collect()
                };
                RadioResponse::Frames(frames)
            }
            ToRadio::WantConfig { nonce } => {
                let mut frames = self.config_frames();
                frames.extend(self.node_db.iter().cloned().map(FromRadio::NodeInfo));
                frames.push(FromRadio::ConfigComplete { nonce: *nonce });
                RadioResponse::Frames(frames)
            }
            ToRadio::Heartbeat { .. } if self.answer_heartbeats => {
                RadioResponse::Frames(vec![FromRadio::QueueStatus(QueueStatus {
                    free: 16,
                    max: 16,
                    mesh_packet_id: 0,
                })])
            }
            ToRadio::Packet(packet) => RadioResponse::Frames(vec![FromRadio::QueueStatus(
                QueueStatus {
                    free: 15,
                    max: 16,
                    mesh_packet_id: packet.id,
                },
            )]),
            ToRadio::Heartbeat { .. } | ToRadio::Disconnect | ToRadio::MqttProxy(_) => {
                RadioResponse::Nothing
            }
        }
    }

    fn config_frames(&self) -> Vec<FromRadio> {
        let mut frames = vec![
            FromRadio::MyInfo(MyNodeInfo {
                my_node_num: self.my_node_num,
                reboot_count: 1,
            }),
            FromRadio::Metadata(DeviceMetadata {
                firmware_version: self.firmware.clone(),
                hw_model: self.hw_model.clone(),
                has_bluetooth: true,
                has_wifi: false,
            }),
        ];
        frames.extend(self.config_sections.iter().map(|section| {
            FromRadio::Config(ConfigEntry {
                section: section.clone(),
                payload: Vec::new(),
            })
        }));
        frames.extend(self.channels.iter().enumerate().map(|(index, name)| {
            FromRadio::Channel(ChannelInfo {
                index: index as u8,
                name: name.clone(),
                role: if index == 0 { 1 } else { 2 },
            })
        }));
        frames
    }
}

/// A plausible node-database entry for node `num`
pub fn node_info(num: u32) -> NodeInfo {
    NodeInfo {
        num: NodeNum(num),
        long_name: format!("Mesh Node {num}"),
        short_name: format!("N{num}"),
        last_heard: 1_700_000_000 + num,
        snr: Some(6.25),
    }
}
