//! Configuration handshake
//!
//! After a session opens the client asks for the device configuration
//! (`WantConfig` with [`WANT_CONFIG_NONCE`]) and then for the node database
//! ([`WANT_DATABASE_NONCE`]). The coordinator owns one waiter per request and
//! the database-ready [`Gate`], and inspects every received frame for the
//! signals that complete them.
//!
//! The database waiter completes on the first node entry *or* on the
//! completion marker, whichever arrives first; the device may legally send
//! them in either order. The gate opens only on the completion marker.

use meshlink_core::protocol::{FromRadio, ToRadio};
use meshlink_core::{FirmwareVersion, MeshError, NodeNum, WANT_CONFIG_NONCE, WANT_DATABASE_NONCE};
use tracing::{debug, info, warn};

use crate::waiter::{Gate, OneShotSlot, Waiter};

/// What a received frame meant for the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeSignal {
    None,
    /// The device reported its own node number
    NodeIdentity(NodeNum),
    /// The device reported its firmware version
    Firmware(Option<FirmwareVersion>),
    ConfigComplete,
    /// A node-database entry; `index` is zero-based within this request
    DatabaseEntry { index: u32 },
    DatabaseComplete,
}

pub struct HandshakeCoordinator {
    min_firmware: FirmwareVersion,
    config: OneShotSlot<()>,
    database: OneShotSlot<()>,
    database_ready: Gate,
    receiving_database: bool,
    database_entries: u32,
    firmware: Option<FirmwareVersion>,
}

impl HandshakeCoordinator {
    pub fn new(min_firmware: FirmwareVersion, database_ready: Gate) -> Self {
        Self {
            min_firmware,
            config: OneShotSlot::new("want-config"),
            database: OneShotSlot::new("want-database"),
            database_ready,
            receiving_database: false,
            database_entries: 0,
            firmware: None,
        }
    }

    /// Prepare for a fresh session: forget what the previous one learned
    pub fn reset(&mut self) {
        self.config.cancel();
        self.database.cancel();
        self.database_ready.reset();
        self.receiving_database = false;
        self.database_entries = 0;
        self.firmware = None;
    }

    /// Install the configuration waiter and build its request
    ///
    /// A previously pending configuration waiter resolves with `Cancelled`.
    pub fn begin_want_config(&mut self) -> (ToRadio, Waiter<()>) {
        let waiter = self.config.install(WANT_CONFIG_NONCE);
        debug!("Requesting configuration (nonce {})", WANT_CONFIG_NONCE);
        (
            ToRadio::WantConfig {
                nonce: WANT_CONFIG_NONCE,
            },
            waiter,
        )
    }

    /// Install the node-database waiter and build its request
    pub fn begin_want_database(&mut self) -> (ToRadio, Waiter<()>) {
        let waiter = self.database.install(WANT_DATABASE_NONCE);
        self.database_ready.reset();
        self.receiving_database = true;
        self.database_entries = 0;
        debug!("Requesting node database (nonce {})", WANT_DATABASE_NONCE);
        (
            ToRadio::WantConfig {
                nonce: WANT_DATABASE_NONCE,
            },
            waiter,
        )
    }

    /// Inspect one received frame
    pub fn on_frame(&mut self, frame: &FromRadio) -> HandshakeSignal {
        match frame {
            FromRadio::MyInfo(info) => HandshakeSignal::NodeIdentity(info.my_node_num),
            FromRadio::Metadata(metadata) => {
                self.firmware = metadata.parsed_firmware().ok();
                if self.firmware.is_none() {
                    warn!("Unparseable firmware version '{}'", metadata.firmware_version);
                }
                HandshakeSignal::Firmware(self.firmware)
            }
            FromRadio::NodeInfo(_) if self.receiving_database => {
                let index = self.database_entries;
                self.database_entries += 1;
                self.database.resolve(WANT_DATABASE_NONCE, ());
                HandshakeSignal::DatabaseEntry { index }
            }
            FromRadio::ConfigComplete { nonce } if *nonce == WANT_CONFIG_NONCE => {
                self.complete_config();
                HandshakeSignal::ConfigComplete
            }
            FromRadio::ConfigComplete { nonce } if *nonce == WANT_DATABASE_NONCE => {
                self.database.resolve(WANT_DATABASE_NONCE, ());
                self.receiving_database = false;
                self.database_ready.open();
                info!("Node database complete ({} entries)", self.database_entries);
                HandshakeSignal::DatabaseComplete
            }
            FromRadio::ConfigComplete { nonce } => {
                debug!("Ignoring completion for unknown nonce {}", nonce);
                HandshakeSignal::None
            }
            _ => HandshakeSignal::None,
        }
    }

    /// Fail every waiter; the gate stays cancelled until the next session
    pub fn cancel_all(&mut self) {
        self.config.cancel();
        self.database.cancel();
        self.database_ready.cancel_all();
        self.receiving_database = false;
    }

    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    pub fn database_ready(&self) -> &Gate {
        &self.database_ready
    }

    fn complete_config(&mut self) {
        match self.firmware {
            Some(actual) if actual < self.min_firmware => {
                warn!(
                    "Firmware {} is older than the required {}",
                    actual, self.min_firmware
                );
                self.config.fail(
                    WANT_CONFIG_NONCE,
                    MeshError::VersionMismatch {
                        required: self.min_firmware,
                        actual,
                    },
                );
            }
            _ => {
                self.config.resolve(WANT_CONFIG_NONCE, ());
            }
        }
    }
}
