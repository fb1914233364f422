//! Saga error types.

use common::CorrelationId;
use instance_store::InstanceStoreError;
use thiserror::Error;

/// Errors that can occur while running saga instances.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A non-creating mutating event addressed a key with no instance.
    #[error("Unknown instance: {0}")]
    UnknownInstance(CorrelationId),

    /// No transition exists for the event in the current state.
    #[error("Event '{event}' is not handled in state {state} (instance {id})")]
    UnhandledEvent {
        id: CorrelationId,
        state: String,
        event: &'static str,
    },

    /// Every compare-and-swap attempt lost against a concurrent writer.
    #[error("Gave up on instance {id} after {attempts} conflicting writes")]
    ConcurrencyExhausted { id: CorrelationId, attempts: u32 },

    /// Instance store error.
    #[error("Instance store error: {0}")]
    Store(#[from] InstanceStoreError),

    /// The scheduling gateway rejected a request.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// A derived event could not be published.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The ingress channel has no receiver left.
    #[error("Event ingress is closed")]
    IngressClosed,

    /// The delivery task panicked or was cancelled by runtime shutdown.
    #[error("Delivery interrupted: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

impl SagaError {
    /// Returns true if redelivering the same event may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SagaError::ConcurrencyExhausted { .. }
            | SagaError::Scheduling(_)
            | SagaError::Publish(_)
            | SagaError::IngressClosed => true,
            SagaError::Store(e) => matches!(
                e,
                InstanceStoreError::VersionConflict { .. }
                    | InstanceStoreError::Unavailable(_)
                    | InstanceStoreError::Database(_)
            ),
            SagaError::Interrupted(e) => e.is_cancelled(),
            SagaError::UnknownInstance(_)
            | SagaError::UnhandledEvent { .. }
            | SagaError::Serialization(_) => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
