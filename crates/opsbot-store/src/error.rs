//! Error types for the opsbot-store crate.

use opsbot_core::{AssociationError, ValidationErrors};

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Changeset was invalid, either before or at commit
    #[error("Validation failed: {0}")]
    Invalid(ValidationErrors),

    /// Store file or migration directory has an unexpected shape
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Validation errors carried by this error, if any.
    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            StoreError::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<StoreError> for AssociationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => AssociationError::NotFound { entity, name: key },
            other => AssociationError::Backend(other.to_string()),
        }
    }
}
