use thiserror::Error;

use crate::{CorrelationId, Version};

/// Errors that can occur when interacting with the instance store.
#[derive(Debug, Error)]
pub enum InstanceStoreError {
    /// A compare-and-swap write observed a different stored version.
    #[error("Version conflict for instance {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: CorrelationId,
        expected: Version,
        actual: Version,
    },

    /// The instance was not found in the store.
    #[error("Instance not found: {0}")]
    InstanceNotFound(CorrelationId),

    /// The backend could not be reached.
    #[error("Instance store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InstanceStoreError {
    /// Returns true for optimistic-concurrency collisions.
    pub fn is_conflict(&self) -> bool {
        matches!(self, InstanceStoreError::VersionConflict { .. })
    }
}

/// Result type for instance store operations.
pub type Result<T> = std::result::Result<T, InstanceStoreError>;
