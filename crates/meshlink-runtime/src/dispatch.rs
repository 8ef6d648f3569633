//! Packet dispatch boundary
//!
//! Frames that are not handshake completion signals are handed to exactly
//! one registered handler: mesh packets by application port, everything else
//! by frame kind. A fallback catches whatever has no specific handler.

use std::collections::HashMap;
use std::sync::Arc;

use meshlink_core::{FrameKind, FromRadio, PortNum};
use tracing::trace;

/// Receiver for frames routed out of the connection manager
///
/// Handlers run on the manager's task and must not block.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: &FromRadio);
}

impl<F> FrameHandler for F
where
    F: Fn(&FromRadio) + Send + Sync,
{
    fn handle(&self, frame: &FromRadio) {
        self(frame)
    }
}

#[derive(Clone, Default)]
pub struct PacketDispatcher {
    ports: HashMap<PortNum, Arc<dyn FrameHandler>>,
    kinds: HashMap<FrameKind, Arc<dyn FrameHandler>>,
    fallback: Option<Arc<dyn FrameHandler>>,
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route mesh packets on `port` to `handler`
    pub fn on_port(&mut self, port: PortNum, handler: impl FrameHandler + 'static) {
        self.ports.insert(port, Arc::new(handler));
    }

    /// Route non-packet frames of `kind` to `handler`
    pub fn on_kind(&mut self, kind: FrameKind, handler: impl FrameHandler + 'static) {
        self.kinds.insert(kind, Arc::new(handler));
    }

    pub fn set_fallback(&mut self, handler: impl FrameHandler + 'static) {
        self.fallback = Some(Arc::new(handler));
    }

    /// Hand `frame` to its handler; false if nobody wanted it
    pub fn dispatch(&self, frame: &FromRadio) -> bool {
        let specific = match frame {
            FromRadio::Packet(packet) => self.ports.get(&packet.port),
            other => self.kinds.get(&other.kind()),
        };
        match specific.or(self.fallback.as_ref()) {
            Some(handler) => {
                handler.handle(frame);
                true
            }
            None => {
                trace!("No handler for {} frame", frame.kind());
                false
            }
        }
    }
}
