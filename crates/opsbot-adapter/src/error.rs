//! Error types for the opsbot-adapter crate.

/// Errors in the chat adapter configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Adapter name is outside the supported set
    #[error("Unsupported chat adapter '{name}'. Set the adapter to one of: {supported}")]
    UnknownAdapter { name: String, supported: String },

    /// Adapter is known but nothing can supervise it
    #[error(
        "No supervisor is defined for the '{adapter}' chat adapter. \
         A supervisor must be defined as '{supervisor}' before this adapter can be used"
    )]
    MissingSupervisor { adapter: String, supervisor: String },
}
