//! Sequential step runner
//!
//! Runs an ordered list of named async steps. A failed step is retried up to
//! [`RetryConfig::max_attempts`] times with backoff; steps already completed
//! are never re-run. The owner steers a running sequence through
//! [`RunnerHandle`]: cancel it outright, or fail only the step currently in
//! flight (which the runner then retries like any other failure). Dropping
//! every handle does not cancel the sequence; it runs to completion.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use meshlink_core::{MeshError, MeshResult, RetryConfig};
use tokio::sync::mpsc;
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Steps
// ----------------------------------------------------------------------------

type StepAction = Box<dyn FnMut() -> BoxFuture<'static, MeshResult<()>> + Send>;

/// A named, re-runnable unit of work
pub struct Step {
    name: &'static str,
    action: StepAction,
}

impl Step {
    pub fn new<F, Fut>(name: &'static str, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = MeshResult<()>> + Send + 'static,
    {
        Self {
            name,
            action: Box::new(move || action().boxed()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Progress reported while a sequence runs
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    Started {
        index: usize,
        name: &'static str,
        attempt: u32,
    },
    /// `attempt` attempts have failed and another one follows after backoff
    Retrying {
        index: usize,
        name: &'static str,
        attempt: u32,
        error: MeshError,
    },
    Succeeded {
        index: usize,
        name: &'static str,
    },
    /// Terminal; sent exactly once per run
    Finished(MeshResult<()>),
}

enum Control {
    /// `attempt` is the attempt id that was in flight when the error was seen
    CancelCurrent {
        attempt: u64,
        error: MeshError,
        cancel_full: bool,
    },
    CancelAll,
}

/// Next control message; pends forever once every handle is gone
async fn next_control(control: &mut mpsc::UnboundedReceiver<Control>) -> Control {
    match control.recv().await {
        Some(ctl) => ctl,
        None => std::future::pending().await,
    }
}

// ----------------------------------------------------------------------------
// Runner
// ----------------------------------------------------------------------------

pub struct SequentialStepRunner {
    steps: Vec<Step>,
    retry: RetryConfig,
}

impl SequentialStepRunner {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            steps: Vec::new(),
            retry,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Spawn the sequence; progress goes to `notify`
    pub fn start<N>(self, notify: N) -> RunnerHandle
    where
        N: Fn(StepEvent) + Send + Sync + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let current = Arc::new(AtomicU64::new(0));
        let flag = running.clone();
        let attempt_id = current.clone();

        tokio::spawn(async move {
            let result = self.run(control_rx, attempt_id, &notify).await;
            flag.store(false, Ordering::SeqCst);
            notify(StepEvent::Finished(result));
        });

        RunnerHandle {
            control: control_tx,
            running,
            current,
        }
    }

    async fn run<N>(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        current: Arc<AtomicU64>,
        notify: &N,
    ) -> MeshResult<()>
    where
        N: Fn(StepEvent) + Send + Sync,
    {
        let max_attempts = self.retry.max_attempts.max(1);

        for (index, step) in self.steps.iter_mut().enumerate() {
            let name = step.name;
            let mut attempt = 1;

            loop {
                let attempt_id = current.fetch_add(1, Ordering::SeqCst) + 1;
                notify(StepEvent::Started {
                    index,
                    name,
                    attempt,
                });

                let mut action = (step.action)();
                let outcome = loop {
                    tokio::select! {
                        biased;
                        ctl = next_control(&mut control) => match ctl {
                            Control::CancelAll => return Err(MeshError::Cancelled),
                            Control::CancelCurrent { error, cancel_full: true, .. } => return Err(error),
                            Control::CancelCurrent { attempt: seen, error, .. } if seen != attempt_id => {
                                debug!("Ignoring stale failure for step '{}': {}", name, error);
                            }
                            Control::CancelCurrent { error, .. } => break Err(error),
                        },
                        result = &mut action => break result,
                    }
                };

                let error = match outcome {
                    Ok(()) => {
                        debug!("Step '{}' succeeded on attempt {}", name, attempt);
                        notify(StepEvent::Succeeded { index, name });
                        break;
                    }
                    Err(error) => error,
                };

                if !error.is_retryable() {
                    warn!("Step '{}' failed permanently: {}", name, error);
                    return Err(error);
                }
                if attempt >= max_attempts {
                    warn!("Step '{}' exhausted {} attempts: {}", name, attempt, error);
                    return Err(MeshError::TooManyRetries {
                        attempts: attempt,
                        last_error: error.to_string(),
                    });
                }

                debug!("Step '{}' attempt {} failed, retrying: {}", name, attempt, error);
                notify(StepEvent::Retrying {
                    index,
                    name,
                    attempt,
                    error,
                });

                let delay = self.retry.delay_for(attempt);
                tokio::select! {
                    biased;
                    ctl = next_control(&mut control) => match ctl {
                        Control::CancelCurrent { error, cancel_full: true, .. } => return Err(error),
                        // already between attempts
                        Control::CancelCurrent { cancel_full: false, .. } => {}
                        Control::CancelAll => return Err(MeshError::Cancelled),
                    },
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Control surface for a running sequence
#[derive(Clone)]
pub struct RunnerHandle {
    control: mpsc::UnboundedSender<Control>,
    running: Arc<AtomicBool>,
    current: Arc<AtomicU64>,
}

impl RunnerHandle {
    /// Abort the whole sequence; it finishes with `Cancelled`
    pub fn cancel(&self) {
        let _ = self.control.send(Control::CancelAll);
    }

    /// Fail the step in flight with `error`
    ///
    /// With `cancel_full_process` the sequence ends with `error`; otherwise
    /// the failure goes through the normal retry policy. The failure is bound
    /// to the attempt in flight now; if that attempt has already finished by
    /// the time the runner sees it, it is dropped.
    pub fn cancel_currently_executing_step(&self, error: MeshError, cancel_full_process: bool) {
        let _ = self.control.send(Control::CancelCurrent {
            attempt: self.current.load(Ordering::SeqCst),
            error,
            cancel_full: cancel_full_process,
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
