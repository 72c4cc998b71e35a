//! Client error types.

use std::time::Duration;

use switchboard_core::envelope::ErrorBody;
use switchboard_core::errors::codes;
use switchboard_core::topic::TopicError;
use thiserror::Error;

/// Failures surfaced to callers of [`crate::Client`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The connection dropped after the command was sent and before its
    /// response arrived. Says nothing about whether the server executed it.
    #[error("connection lost before the response arrived")]
    ConnectionLost,
    /// No response within the request deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The server answered with an error body.
    #[error("{code}: {message}")]
    Remote {
        /// Wire error code.
        code: String,
        /// Server-provided message.
        message: String,
    },
    /// Topic rejected locally before anything was sent.
    #[error(transparent)]
    Topic(#[from] TopicError),
    /// The client was shut down.
    #[error("client is closed")]
    Closed,
    /// The client gave up reconnecting; a restart is required.
    #[error("client failed: {0}")]
    Failed(String),
    /// A response payload did not have the expected shape.
    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl ClientError {
    /// Wire-style error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::ConnectionLost | Self::Closed | Self::Failed(_) => codes::CONNECTION_LOST,
            Self::Remote { code, .. } => code,
            Self::Topic(_) => codes::UNKNOWN_TOPIC,
            Self::Timeout(_) | Self::Payload(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<ErrorBody> for ClientError {
    fn from(body: ErrorBody) -> Self {
        Self::Remote {
            code: body.code,
            message: body.message,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
