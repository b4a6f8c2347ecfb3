//! opsbot-supervisor: Worker lifecycle and one-for-one supervision.

mod error;
pub mod supervisor;
pub mod traits;

pub use error::{SupervisorError, WorkerError};
pub use supervisor::{RestartIntensity, Supervisor, SupervisorHandle};
pub use traits::{Shutdown, ShutdownTrigger, Worker, DEFAULT_SHUTDOWN_GRACE};
