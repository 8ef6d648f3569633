//! Mailbox types for the manager task
//!
//! Public requests arrive on the command channel; everything the manager
//! spawns (scan forwarder, connection forwarders, step runner, timers)
//! reports back on the internal channel. Connection and runner messages carry
//! the session/run id they were issued for.

use std::sync::Arc;

use meshlink_core::{
    Connection, ConnectionEvent, ConnectionEvents, DeviceId, DiscoveryEvent, MeshResult, ToRadio,
};
use tokio::sync::oneshot;

use crate::heartbeat::HeartbeatSignal;
use crate::step_runner::StepEvent;
use crate::waiter::Waiter;

pub(crate) type Reply<T> = oneshot::Sender<MeshResult<T>>;

pub(crate) enum Command {
    StartDiscovery { reply: Reply<()> },
    StopDiscovery { reply: Reply<()> },
    Connect { device: DeviceId, reply: Reply<()> },
    Disconnect { reply: Reply<()> },
    CloseConnection { reply: Reply<()> },
    Send { frame: ToRadio, reply: Reply<()> },
    Suspend { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakeRequest {
    Config,
    Database,
}

pub(crate) enum Internal {
    Discovery { scan: u64, event: DiscoveryEvent },
    DiscoveryEnded { scan: u64 },
    Connection { session: u64, event: ConnectionEvent },
    Step { run: u64, event: StepEvent },
    Heartbeat(HeartbeatSignal),
    SessionOpened {
        run: u64,
        connection: Arc<dyn Connection>,
        events: ConnectionEvents,
        reply: Reply<()>,
    },
    Handshake {
        run: u64,
        request: HandshakeRequest,
        reply: Reply<Waiter<()>>,
    },
}
