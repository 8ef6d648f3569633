//! Resettable one-shot timer
//!
//! Each arm bumps a generation counter; the callback receives the generation
//! it was armed with. The owner checks it with [`ResettableTimer::take_fired`]
//! so a callback already queued when the timer was re-armed or cancelled is
//! recognised as stale and ignored.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

pub struct ResettableTimer {
    name: &'static str,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl ResettableTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            task: None,
            generation: 0,
        }
    }

    /// Schedule `on_fire` after `delay`, replacing any pending schedule
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.abort_task();
        self.generation += 1;
        let generation = self.generation;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation);
        }));
        trace!(timer = self.name, generation, ?delay, "armed");
        generation
    }

    /// Drop the pending schedule; callbacks already in flight become stale
    pub fn cancel(&mut self, reason: &str) {
        if self.task.is_some() {
            trace!(timer = self.name, reason, "cancelled");
        }
        self.abort_task();
        self.generation += 1;
    }

    /// Accept a fired callback if it belongs to the current schedule
    pub fn take_fired(&mut self, generation: u64) -> bool {
        if self.task.is_some() && generation == self.generation {
            self.task = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ResettableTimer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_schedule() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ResettableTimer::new("test");

        let first = timer.arm(Duration::from_secs(10), {
            let tx = tx.clone();
            move |g| {
                let _ = tx.send(g);
            }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        let second = timer.arm(Duration::from_secs(10), move |g| {
            let _ = tx.send(g);
        });

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, second);
        assert!(!timer.take_fired(first));
        assert!(timer.take_fired(fired));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_makes_inflight_callback_stale() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ResettableTimer::new("test");
        timer.arm(Duration::from_secs(1), move |g| {
            let _ = tx.send(g);
        });

        let fired = rx.recv().await.unwrap();
        timer.cancel("closed");
        assert!(!timer.take_fired(fired));
    }
}
