//! Engine error types.

use switchboard_core::errors::codes;
use thiserror::Error;

/// Failures of engine operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No entity with this id is visible to the caller.
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    /// No cron job with this id.
    #[error("job not found: {0}")]
    JobNotFound(String),
    /// The directory is full.
    #[error("entity limit reached ({0})")]
    LimitReached(usize),
    /// The engine profile does not offer this operation.
    #[error("{0} is not available in this engine profile")]
    Unsupported(&'static str),
    /// Arguments failed validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl EngineError {
    /// Wire error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) | Self::JobNotFound(_) => codes::NOT_FOUND,
            Self::LimitReached(_) => codes::LIMIT_REACHED,
            Self::Unsupported(_) => codes::UNSUPPORTED_OPERATION,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
