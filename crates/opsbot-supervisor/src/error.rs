//! Error types for the opsbot-supervisor crate.

use std::time::Duration;

/// Errors a worker reports from `init` or `run`.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Worker-specific failure
    #[error("{0}")]
    Failed(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn failed(message: impl Into<String>) -> Self {
        WorkerError::Failed(message.into())
    }
}

/// Errors raised by a supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A child's `init` failed while the tree was starting
    #[error("Child '{child}' failed to start: {reason}")]
    StartFailed { child: String, reason: String },

    /// Restarts exceeded the configured intensity
    #[error("Child '{child}' exceeded restart intensity ({max_restarts} restarts within {within:?})")]
    RestartIntensityExceeded {
        child: String,
        max_restarts: u32,
        within: Duration,
    },

    /// Every child has stopped
    #[error("Supervisor stopped")]
    Stopped,
}
