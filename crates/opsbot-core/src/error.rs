//! Error types for the opsbot-core crate.

/// Core error type for configuration and model plumbing.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unrecognized runtime environment name
    #[error("Unknown environment '{0}'. Expected one of: development, test, production")]
    UnknownEnvironment(String),
}
