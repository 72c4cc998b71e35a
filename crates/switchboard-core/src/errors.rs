//! Protocol error taxonomy.
//!
//! Every failure that crosses a component boundary maps to one of these
//! variants, each with a stable machine-readable code used in
//! `response.error.code` payloads.

use serde::{Deserialize, Serialize};

/// Wire error codes.
pub mod codes {
    /// Envelope failed to decode.
    pub const MALFORMED_ENVELOPE: &str = "MALFORMED_ENVELOPE";
    /// Handshake credential missing or invalid.
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    /// Topic outside the grammar.
    pub const UNKNOWN_TOPIC: &str = "UNKNOWN_TOPIC";
    /// Transport dropped while a command was in flight.
    pub const CONNECTION_LOST: &str = "CONNECTION_LOST";
    /// Connection closed for silence.
    pub const IDLE_TIMEOUT: &str = "IDLE_TIMEOUT";
    /// Backend lacks the capability for this operation.
    pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
    /// Command parameters failed validation.
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    /// Referenced resource does not exist.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// No handler registered for the command.
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
    /// A configured limit was reached.
    pub const LIMIT_REACHED: &str = "LIMIT_REACHED";
    /// Unexpected server-side failure.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Closed set of protocol-level failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolError {
    /// Envelope failed to decode; the payload was dropped.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Human-readable decode failure.
        reason: String,
    },
    /// Handshake credential missing or invalid.
    #[error("unauthorized handshake")]
    UnauthorizedHandshake,
    /// Subscribe to a topic outside the grammar.
    #[error("unknown topic: {topic}")]
    UnknownTopic {
        /// The rejected topic string.
        topic: String,
    },
    /// Transport dropped while a command was in flight.
    #[error("connection lost")]
    ConnectionLost,
    /// The connection was closed for silence.
    #[error("idle timeout")]
    IdleTimeout,
    /// The active backend lacks the capability.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Name of the refused operation.
        operation: String,
    },
}

impl ProtocolError {
    /// Stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope { .. } => codes::MALFORMED_ENVELOPE,
            Self::UnauthorizedHandshake => codes::UNAUTHORIZED,
            Self::UnknownTopic { .. } => codes::UNKNOWN_TOPIC,
            Self::ConnectionLost => codes::CONNECTION_LOST,
            Self::IdleTimeout => codes::IDLE_TIMEOUT,
            Self::UnsupportedOperation { .. } => codes::UNSUPPORTED_OPERATION,
        }
    }
}
