//! Server error types.

use switchboard_core::errors::codes;
use switchboard_core::topic::TopicError;
use switchboard_engine::EngineError;
use thiserror::Error;

/// Failures of [`crate::websocket::hub::SubscriptionHub`] operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HubError {
    /// The topic is outside the registry's grammar.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    /// No open connection with this id.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),
    /// The topic belongs to a tenant the principal cannot see.
    #[error("topic {0} is outside the caller's tenant")]
    Forbidden(String),
}

impl From<TopicError> for HubError {
    fn from(err: TopicError) -> Self {
        match err {
            TopicError::Empty => Self::UnknownTopic(String::new()),
            TopicError::Unknown(t) | TopicError::InvalidInstance(t) => Self::UnknownTopic(t),
        }
    }
}

/// Error returned by a command handler; becomes a response `error` body.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },
    /// Topic outside the grammar.
    #[error("unknown topic: {topic}")]
    UnknownTopic {
        /// The rejected topic.
        topic: String,
    },
    /// No handler for this command.
    #[error("command '{command}' not found")]
    MethodNotFound {
        /// The command name.
        command: String,
    },
    /// The server's engine profile lacks the capability.
    #[error("{operation} is not supported")]
    Unsupported {
        /// The refused operation.
        operation: String,
    },
    /// Domain failure with its own code.
    #[error("{message}")]
    Domain {
        /// Machine-readable code.
        code: &'static str,
        /// Human-readable message.
        message: String,
    },
    /// Unexpected failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl CommandError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => codes::INVALID_PARAMS,
            Self::UnknownTopic { .. } => codes::UNKNOWN_TOPIC,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::Unsupported { .. } => codes::UNSUPPORTED_OPERATION,
            Self::Domain { code, .. } => code,
            Self::Internal { .. } => codes::INTERNAL_ERROR,
        }
    }
}

impl From<EngineError> for CommandError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidParams(message) => Self::InvalidParams { message },
            EngineError::Unsupported(operation) => Self::Unsupported {
                operation: operation.to_owned(),
            },
            other => Self::Domain {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

impl From<HubError> for CommandError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::UnknownTopic(topic) => Self::UnknownTopic { topic },
            HubError::UnknownConnection(id) => Self::Internal {
                message: format!("connection {id} is gone"),
            },
            HubError::Forbidden(topic) => Self::Domain {
                code: codes::UNAUTHORIZED,
                message: format!("topic {topic} is outside the caller's tenant"),
            },
        }
    }
}
