//! Liveness monitoring
//!
//! Two timers drive it. The probe timer fires after [`HeartbeatConfig::interval`]
//! without inbound traffic; the owner then sends a heartbeat and, if the
//! firmware acknowledges heartbeats, arms the timeout timer. Any inbound data
//! cancels the timeout and restarts the probe timer. A timeout that fires is a
//! liveness failure, reported exactly once per armed probe.
//!
//! Timer callbacks go through `notify` so the owner can handle them on its
//! own task; the owner hands them back via [`HeartbeatMonitor::on_probe_due`]
//! and [`HeartbeatMonitor::on_timeout`], which reject stale generations.

use std::sync::Arc;

use meshlink_core::protocol::generate_heartbeat_nonce;
use meshlink_core::HeartbeatConfig;
use tracing::{debug, warn};

use crate::timer::ResettableTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatSignal {
    ProbeDue { generation: u64 },
    TimedOut { generation: u64 },
}

type Notify = Arc<dyn Fn(HeartbeatSignal) + Send + Sync>;

pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    notify: Notify,
    probe: ResettableTimer,
    timeout: ResettableTimer,
    ack_supported: bool,
    running: bool,
}

impl HeartbeatMonitor {
    pub fn new<N>(config: HeartbeatConfig, notify: N) -> Self
    where
        N: Fn(HeartbeatSignal) + Send + Sync + 'static,
    {
        Self {
            config,
            notify: Arc::new(notify),
            probe: ResettableTimer::new("heartbeat"),
            timeout: ResettableTimer::new("heartbeat-timeout"),
            ack_supported: false,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.timeout.cancel("restart");
        self.arm_probe();
    }

    pub fn stop(&mut self, reason: &str) {
        if self.running {
            debug!("Heartbeat stopped: {}", reason);
        }
        self.running = false;
        self.probe.cancel(reason);
        self.timeout.cancel(reason);
    }

    /// Whether the peer answers probes; decides if a probe arms the timeout
    pub fn set_ack_supported(&mut self, supported: bool) {
        self.ack_supported = supported;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Inbound traffic of any kind proves the link alive
    pub fn on_data_received(&mut self) {
        if !self.running {
            return;
        }
        self.timeout.cancel("data received");
        self.arm_probe();
    }

    /// Accept a probe-timer callback; returns the nonce to send
    ///
    /// The probe timer is re-armed immediately. Call
    /// [`HeartbeatMonitor::probe_sent`] once the probe is on the wire.
    pub fn on_probe_due(&mut self, generation: u64) -> Option<u32> {
        if !self.running || !self.probe.take_fired(generation) {
            return None;
        }
        self.arm_probe();
        Some(generate_heartbeat_nonce())
    }

    pub fn probe_sent(&mut self) {
        if !self.running || !self.ack_supported {
            return;
        }
        let notify = self.notify.clone();
        self.timeout.arm(self.config.timeout, move |generation| {
            notify(HeartbeatSignal::TimedOut { generation })
        });
    }

    /// Accept a timeout callback; true means the link is considered dead
    ///
    /// Monitoring stops so no second failure is reported for the same link.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        if !self.running || !self.timeout.take_fired(generation) {
            return false;
        }
        warn!(
            "No response within {:?} of heartbeat probe",
            self.config.timeout
        );
        self.stop("liveness failure");
        true
    }

    fn arm_probe(&mut self) {
        let notify = self.notify.clone();
        self.probe.arm(self.config.interval, move |generation| {
            notify(HeartbeatSignal::ProbeDue { generation })
        });
    }
}
