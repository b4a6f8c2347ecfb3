//! Error types for the opsbot-runtime crate.

use opsbot_adapter::ConfigurationError;
use opsbot_core::Environment;
use opsbot_store::StoreError;
use opsbot_supervisor::SupervisorError;

/// Errors that stop the bootstrap sequence.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// The async runtime lacks something the workers depend on
    #[error("Runtime capability check failed: {0}")]
    Capability(String),

    /// Chat adapter configuration is invalid
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The supervision tree could not start or failed fatally
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// On-disk migrations and the migration table disagree
    #[error(
        "Schema migration mismatch in {environment}: migration files are at version \
         {file_version} but the store has applied {db_version}. Run `opsbot migrate`"
    )]
    MigrationDrift {
        file_version: u64,
        db_version: u64,
        environment: Environment,
    },

    /// Store or migration directory error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// `start` was called on a sequence that already ran
    #[error("Bootstrap has already been started")]
    AlreadyStarted,
}
