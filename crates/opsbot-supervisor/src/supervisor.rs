//! One-for-one supervisor.
//!
//! Children start in list order, each only after its predecessor's `init`
//! returned. When a child's `run` returns or panics outside of shutdown, only
//! that child is restarted. Restarts across all children are bounded by a
//! [`RestartIntensity`]; exceeding it is fatal for the whole tree.

use crate::error::SupervisorError;
use crate::traits::{Shutdown, ShutdownTrigger, Worker};
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Maximum restarts tolerated within a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartIntensity {
    pub max_restarts: u32,
    pub within: Duration,
}

impl Default for RestartIntensity {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            within: Duration::from_secs(5),
        }
    }
}

struct RestartBudget {
    intensity: RestartIntensity,
    history: Mutex<VecDeque<Instant>>,
}

impl RestartBudget {
    fn new(intensity: RestartIntensity) -> Self {
        Self {
            intensity,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a restart. Returns `false` once the intensity is exceeded.
    fn record(&self) -> bool {
        let now = Instant::now();
        let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        history.push_back(now);
        while history
            .front()
            .is_some_and(|at| now.duration_since(*at) > self.intensity.within)
        {
            history.pop_front();
        }
        history.len() <= self.intensity.max_restarts as usize
    }
}

struct ChildHandle {
    name: String,
    grace: Duration,
    trigger: ShutdownTrigger,
    restarts: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

/// Starts supervision trees.
pub struct Supervisor;

impl Supervisor {
    /// Initialize and spawn `children` in order.
    ///
    /// If any child's `init` fails, the children already running are stopped
    /// in reverse order and the error is returned.
    pub async fn start(
        children: Vec<Arc<dyn Worker>>,
        intensity: RestartIntensity,
    ) -> Result<SupervisorHandle, SupervisorError> {
        let budget = Arc::new(RestartBudget::new(intensity));
        let (fatal_tx, fatal_rx) = mpsc::channel(children.len().max(1));
        let mut started: Vec<ChildHandle> = Vec::with_capacity(children.len());

        for worker in children {
            let name = worker.name().to_string();
            if let Err(err) = worker.init().await {
                error!(child = %name, error = %err, "child failed to start");
                stop_children(started).await;
                return Err(SupervisorError::StartFailed {
                    child: name,
                    reason: err.to_string(),
                });
            }

            let (trigger, shutdown) = Shutdown::pair();
            let restarts = Arc::new(AtomicU32::new(0));
            let grace = worker.shutdown_grace();
            let task = tokio::spawn(supervise(
                worker,
                shutdown,
                budget.clone(),
                restarts.clone(),
                fatal_tx.clone(),
            ));
            info!(child = %name, "child started");
            started.push(ChildHandle {
                name,
                grace,
                trigger,
                restarts,
                task,
            });
        }

        Ok(SupervisorHandle {
            children: started,
            fatal_rx,
        })
    }
}

async fn supervise(
    worker: Arc<dyn Worker>,
    shutdown: Shutdown,
    budget: Arc<RestartBudget>,
    restarts: Arc<AtomicU32>,
    fatal: mpsc::Sender<SupervisorError>,
) {
    let name = worker.name().to_string();
    let mut needs_init = false;

    loop {
        if needs_init {
            if let Err(err) = worker.init().await {
                warn!(child = %name, error = %err, "child failed to reinitialize");
                if shutdown.is_requested() || !restart_allowed(&name, &budget, &restarts, &fatal).await {
                    break;
                }
                continue;
            }
        }
        needs_init = true;

        let outcome = AssertUnwindSafe(worker.run(shutdown.clone()))
            .catch_unwind()
            .await;
        if shutdown.is_requested() {
            if let Ok(Err(err)) = outcome {
                warn!(child = %name, error = %err, "child reported an error while stopping");
            }
            break;
        }

        match outcome {
            Ok(Ok(())) => warn!(child = %name, "child exited unexpectedly"),
            Ok(Err(err)) => warn!(child = %name, error = %err, "child failed"),
            Err(_) => error!(child = %name, "child panicked"),
        }
        if !restart_allowed(&name, &budget, &restarts, &fatal).await {
            break;
        }
    }
}

async fn restart_allowed(
    name: &str,
    budget: &RestartBudget,
    restarts: &AtomicU32,
    fatal: &mpsc::Sender<SupervisorError>,
) -> bool {
    if !budget.record() {
        error!(child = %name, "restart intensity exceeded");
        let _ = fatal
            .send(SupervisorError::RestartIntensityExceeded {
                child: name.to_string(),
                max_restarts: budget.intensity.max_restarts,
                within: budget.intensity.within,
            })
            .await;
        return false;
    }
    let count = restarts.fetch_add(1, Ordering::SeqCst) + 1;
    info!(child = %name, restarts = count, "restarting child");
    true
}

async fn stop_children(children: Vec<ChildHandle>) {
    for mut child in children.into_iter().rev() {
        child.trigger.trigger();
        match tokio::time::timeout(child.grace, &mut child.task).await {
            Ok(_) => info!(child = %child.name, "child stopped"),
            Err(_) => {
                warn!(child = %child.name, grace = ?child.grace, "child did not stop in time; aborting");
                child.task.abort();
            }
        }
    }
}

/// A running supervision tree.
pub struct SupervisorHandle {
    children: Vec<ChildHandle>,
    fatal_rx: mpsc::Receiver<SupervisorError>,
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("children", &self.child_names())
            .finish_non_exhaustive()
    }
}

impl SupervisorHandle {
    /// Child names in start order.
    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }

    /// How many times the named child has been restarted.
    pub fn restarts(&self, name: &str) -> Option<u32> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.restarts.load(Ordering::SeqCst))
    }

    /// Wait until the tree fails. Only returns on a fatal condition.
    pub async fn wait(&mut self) -> SupervisorError {
        self.fatal_rx.recv().await.unwrap_or(SupervisorError::Stopped)
    }

    /// Stop every child in reverse start order.
    pub async fn shutdown(self) {
        info!(children = self.children.len(), "shutting down supervision tree");
        stop_children(self.children).await;
    }
}
