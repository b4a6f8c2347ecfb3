//! Worker trait definition and shutdown signalling.

use crate::error::WorkerError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// Grace period a worker gets to stop before it is aborted.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Receiving half of a shutdown request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending half of a shutdown request.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a connected trigger/receiver pair.
    pub fn pair() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested or the trigger is gone.
    pub async fn requested(&mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// A long-running unit started and restarted by a supervisor.
///
/// `run` may be called again after it returns or panics, so implementations
/// keep any state they need across restarts behind `&self`.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable child name used in logs and restart accounting.
    fn name(&self) -> &str;

    /// How long `run` may take to return after shutdown is requested.
    fn shutdown_grace(&self) -> Duration {
        DEFAULT_SHUTDOWN_GRACE
    }

    /// Bring the worker to a ready state. The next sibling is only started
    /// once this returns `Ok`.
    async fn init(&self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Do the work until `shutdown` is requested.
    async fn run(&self, shutdown: Shutdown) -> Result<(), WorkerError>;
}

// Compile-time check: Worker must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn Worker) {}
};
