//! Lifecycle/collaborator error types.

use thiserror::Error;

/// Result type alias for collaborator and controller operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors from calls against the external collaborators.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The target agent/instance does not exist (anymore). The
    /// controller treats this as idempotent success for Deactivate and
    /// Terminate.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network/transport failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator answered with a payload we could not decode.
    #[error("malformed response: {0}")]
    Decode(String),
}
