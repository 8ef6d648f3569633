//! Waiting primitives for the handshake
//!
//! - [`OneShotSlot`] holds at most one pending single-shot waiter; installing
//!   a new one cancels the previous occupant.
//! - [`Gate`] is a multi-waiter open/closed/cancel-all latch.
//!
//! Both always resolve: a waiter whose operation is abandoned sees
//! [`MeshError::Cancelled`], never a hang.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use meshlink_core::{MeshError, MeshResult};
use tokio::sync::{oneshot, watch};
use tracing::debug;

// ----------------------------------------------------------------------------
// Single-shot Slot
// ----------------------------------------------------------------------------

struct Pending<T> {
    key: u32,
    sender: oneshot::Sender<MeshResult<T>>,
}

/// One-slot holder for a pending completion keyed by nonce
pub struct OneShotSlot<T> {
    name: &'static str,
    pending: Option<Pending<T>>,
}

impl<T> OneShotSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: None,
        }
    }

    /// Install a waiter for `key`, cancelling whatever was pending
    pub fn install(&mut self, key: u32) -> Waiter<T> {
        if self.cancel() {
            debug!("Superseded pending {} waiter", self.name);
        }
        let (sender, receiver) = oneshot::channel();
        self.pending = Some(Pending { key, sender });
        Waiter { receiver }
    }

    /// Complete the pending waiter if it is keyed to `key`
    ///
    /// Returns false when nothing matching was pending, which makes every
    /// later completion for the same request a no-op.
    pub fn resolve(&mut self, key: u32, value: T) -> bool {
        self.complete(key, Ok(value))
    }

    /// Fail the pending waiter if it is keyed to `key`
    pub fn fail(&mut self, key: u32, error: MeshError) -> bool {
        self.complete(key, Err(error))
    }

    /// Resolve the pending waiter, if any, with `Cancelled`
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                let _ = pending.sender.send(Err(MeshError::Cancelled));
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_key(&self) -> Option<u32> {
        self.pending.as_ref().map(|p| p.key)
    }

    fn complete(&mut self, key: u32, result: MeshResult<T>) -> bool {
        match self.pending.take() {
            Some(pending) if pending.key == key => {
                // the receiver may already be gone if its step was cancelled
                let _ = pending.sender.send(result);
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }
}

/// Future side of a [`OneShotSlot`] entry
pub struct Waiter<T> {
    receiver: oneshot::Receiver<MeshResult<T>>,
}

impl<T> Future for Waiter<T> {
    type Output = MeshResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(MeshError::Cancelled)))
    }
}

impl<T> std::fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter").finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Gate
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiters block
    Closed,
    /// Waiters proceed immediately
    Open,
    /// Current and future waiters fail until the gate is reset
    Cancelled,
}

/// Multi-waiter latch shared by everyone interested in one event
#[derive(Clone)]
pub struct Gate {
    state: Arc<watch::Sender<GateState>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Closed);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn open(&self) {
        self.state.send_replace(GateState::Open);
    }

    /// Back to closed; later waiters block again
    pub fn reset(&self) {
        self.state.send_replace(GateState::Closed);
    }

    /// Fail every current waiter and every future one until [`Gate::reset`]
    pub fn cancel_all(&self) {
        self.state.send_replace(GateState::Cancelled);
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub async fn wait(&self) -> MeshResult<()> {
        let mut receiver = self.state.subscribe();
        loop {
            let state = *receiver.borrow_and_update();
            match state {
                GateState::Open => return Ok(()),
                GateState::Cancelled => return Err(MeshError::Cancelled),
                GateState::Closed => {}
            }
            if receiver.changed().await.is_err() {
                return Err(MeshError::Cancelled);
            }
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate").field("state", &self.state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn test_reinstall_cancels_previous_waiter() {
        let mut slot = OneShotSlot::<()>::new("config");
        let first = slot.install(1);
        let second = slot.install(1);

        assert_eq!(first.await, Err(MeshError::Cancelled));
        assert!(slot.resolve(1, ()));
        assert_eq!(second.await, Ok(()));
    }

    #[tokio::test]
    async fn test_resolve_requires_matching_key() {
        let mut slot = OneShotSlot::<u8>::new("config");
        let mut waiter = slot.install(7);

        assert!(!slot.resolve(8, 1));
        assert!((&mut waiter).now_or_never().is_none());
        assert!(slot.resolve(7, 2));
        assert!(!slot.resolve(7, 3));
        assert_eq!(waiter.await, Ok(2));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut slot = OneShotSlot::<()>::new("database");
        let waiter = slot.install(3);

        assert!(slot.cancel());
        assert!(!slot.cancel());
        assert_eq!(waiter.await, Err(MeshError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropping_slot_cancels_waiter() {
        let mut slot = OneShotSlot::<()>::new("config");
        let waiter = slot.install(1);
        drop(slot);
        assert_eq!(waiter.await, Err(MeshError::Cancelled));
    }

    #[tokio::test]
    async fn test_gate_releases_all_waiters() {
        let gate = Gate::new();
        let a = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait().await }
        });
        let b = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait().await }
        });
        tokio::task::yield_now().await;

        gate.open();
        assert_eq!(a.await.unwrap(), Ok(()));
        assert_eq!(b.await.unwrap(), Ok(()));
        assert_eq!(gate.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_gate_cancel_all_until_reset() {
        let gate = Gate::new();
        let pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait().await }
        });
        tokio::task::yield_now().await;

        gate.cancel_all();
        assert_eq!(pending.await.unwrap(), Err(MeshError::Cancelled));
        assert_eq!(gate.wait().await, Err(MeshError::Cancelled));

        gate.reset();
        assert!(gate.wait().now_or_never().is_none());
        gate.open();
        assert_eq!(gate.wait().await, Ok(()));
    }

    #[test]
    fn test_gate_wait_wakes_on_open() {
        let gate = Gate::new();
        let mut wait = tokio_test::task::spawn(gate.wait());
        tokio_test::assert_pending!(wait.poll());

        gate.open();
        assert!(wait.is_woken());
        tokio_test::assert_ready_eq!(wait.poll(), Ok(()));
    }
}
