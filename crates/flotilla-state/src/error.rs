//! Error types for the Flotilla domain model.

use thiserror::Error;

/// Result type alias for state/config operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur loading or validating the domain model.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read config {0}: {1}")]
    ConfigRead(String, String),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
