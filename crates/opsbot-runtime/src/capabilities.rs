//! Probing the async runtime before anything is started on it.

use tokio::runtime::{Handle, RuntimeFlavor};

/// Fewest scheduler threads the worker tree can run on.
pub const MIN_SCHEDULERS: usize = 2;

/// Outcome of a single startup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Ok,
    /// Reported and ignored.
    Warning(String),
    /// Fatal; carries the remediation to show the operator.
    Error(String),
}

impl Check {
    pub fn is_error(&self) -> bool {
        matches!(self, Check::Error(_))
    }
}

/// What the current tokio runtime offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    /// Number of scheduler worker threads.
    pub schedulers: usize,
    /// Whether blocking work runs on a lane separate from the schedulers.
    pub blocking_lane: bool,
}

impl RuntimeCapabilities {
    /// Inspect the runtime this is called from. Outside a runtime nothing is
    /// available.
    pub fn detect() -> Self {
        match Handle::try_current() {
            Ok(handle) => {
                let multi_thread = matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread);
                Self {
                    schedulers: handle.metrics().num_workers(),
                    blocking_lane: multi_thread,
                }
            }
            Err(_) => Self {
                schedulers: 0,
                blocking_lane: false,
            },
        }
    }

    pub fn check_schedulers(&self) -> Check {
        if self.schedulers >= MIN_SCHEDULERS {
            Check::Ok
        } else {
            Check::Error(format!(
                "opsbot needs at least {MIN_SCHEDULERS} scheduler threads but the runtime has {}. \
                 Run on a multi-threaded runtime with `worker_threads` of {MIN_SCHEDULERS} or more",
                self.schedulers
            ))
        }
    }

    pub fn check_blocking_lane(&self) -> Check {
        if self.blocking_lane {
            Check::Ok
        } else {
            Check::Error(
                "opsbot needs a runtime with a separate blocking thread pool. \
                 Start it on tokio's multi-threaded runtime flavor"
                    .to_string(),
            )
        }
    }

    /// Run every check, in order.
    pub fn verify(&self) -> Vec<Check> {
        vec![self.check_schedulers(), self.check_blocking_lane()]
    }
}
