//! Adapter error types.

use switchboard_client::ClientError;
use switchboard_core::capabilities::Capability;
use switchboard_core::errors::codes;
use switchboard_core::topic::TopicError;
use switchboard_engine::EngineError;
use thiserror::Error;

/// Failures surfaced by a [`Backend`](crate::Backend).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The backend's capability map has this flag off. Returned before
    /// anything is attempted.
    #[error("{capability} is not supported by this backend")]
    Unsupported {
        /// The missing flag.
        capability: Capability,
    },

    /// The topic is outside the grammar.
    #[error(transparent)]
    Topic(#[from] TopicError),

    /// The remote transport gave up; the application must restart.
    #[error("backend unusable: {0}")]
    Fatal(String),

    /// A remote call failed.
    #[error(transparent)]
    Remote(ClientError),

    /// A local engine call failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The configured server URL cannot be probed.
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

impl AdapterError {
    /// Wire-style error code, for rendering.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Unsupported { .. } => codes::UNSUPPORTED_OPERATION,
            Self::Topic(_) => codes::UNKNOWN_TOPIC,
            Self::Fatal(_) => codes::CONNECTION_LOST,
            Self::Remote(e) => e.code(),
            Self::Engine(e) => e.code(),
            Self::InvalidUrl { .. } => codes::INVALID_PARAMS,
        }
    }

    /// Whether the backend must be recreated before further use.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<ClientError> for AdapterError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Failed(reason) => Self::Fatal(reason),
            ClientError::Closed => Self::Fatal("client closed".into()),
            ClientError::Topic(e) => Self::Topic(e),
            other => Self::Remote(other),
        }
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
