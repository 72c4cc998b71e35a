//! Envelope codec.
//!
//! Three envelope kinds travel over the transport, discriminated by a
//! `type` field:
//!
//! - `event`: server → client, published on a topic
//! - `command`: client → server, optionally correlated by `request_id`
//! - `response`: server → client, answers exactly one correlated command
//!
//! [`decode`] fails closed: anything that is not UTF-8 JSON text matching
//! one of the three shapes is a [`DecodeError`] and must be dropped by the
//! caller, never partially interpreted.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{EventId, RequestId};
use crate::topic::Topic;

/// Wire discriminants.
const KIND_EVENT: &str = "event";
const KIND_COMMAND: &str = "command";
const KIND_RESPONSE: &str = "response";

// ─────────────────────────────────────────────────────────────────────────────
// Envelope types
// ─────────────────────────────────────────────────────────────────────────────

/// Any message on the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Server-published event.
    Event(EventEnvelope),
    /// Client-issued command.
    Command(CommandEnvelope),
    /// Server answer to a correlated command.
    Response(ResponseEnvelope),
}

/// A published event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Topic the event was published on.
    pub topic: Topic,
    /// Event type, e.g. `message.created`.
    pub event: String,
    /// Structured payload.
    #[serde(default)]
    pub data: Value,
    /// Publication time (UTC, millisecond precision).
    pub timestamp: DateTime<Utc>,
    /// Unique identity; recovery deduplicates on this.
    pub id: EventId,
}

/// A command from client to server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command name, e.g. `subscribe`.
    pub command: String,
    /// Command parameters.
    #[serde(default)]
    pub data: Value,
    /// Correlation id; commands without one are never answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// The answer to one correlated command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Command name this answers (`pong` for `ping`).
    pub command: String,
    /// Result payload (`null` on failure).
    #[serde(default)]
    pub data: Value,
    /// Correlation id copied from the command.
    pub request_id: RequestId,
    /// Present only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Failure detail inside a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (see [`crate::errors::codes`]).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl EventEnvelope {
    /// New event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(topic: Topic, event: impl Into<String>, data: Value) -> Self {
        Self {
            topic,
            event: event.into(),
            data,
            timestamp: now_millis(),
            id: EventId::new(),
        }
    }
}

impl CommandEnvelope {
    /// Correlated command with a fresh request id.
    #[must_use]
    pub fn request(command: impl Into<String>, data: Value) -> Self {
        Self {
            command: command.into(),
            data,
            request_id: Some(RequestId::new()),
        }
    }

    /// Fire-and-forget command.
    #[must_use]
    pub fn notify(command: impl Into<String>, data: Value) -> Self {
        Self {
            command: command.into(),
            data,
            request_id: None,
        }
    }
}

impl ResponseEnvelope {
    /// Successful response.
    #[must_use]
    pub fn ok(command: impl Into<String>, request_id: RequestId, data: Value) -> Self {
        Self {
            command: command.into(),
            data,
            request_id,
            error: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn error(
        command: impl Into<String>,
        request_id: RequestId,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            data: Value::Null,
            request_id,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Whether this response carries an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Envelope {
    /// Wire discriminant of this envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => KIND_EVENT,
            Self::Command(_) => KIND_COMMAND,
            Self::Response(_) => KIND_RESPONSE,
        }
    }

    fn check_shape(&self) -> Result<(), DecodeError> {
        match self {
            Self::Event(e) => {
                if let Err(err) = Topic::parse(e.topic.as_str()) {
                    return Err(DecodeError::InvalidShape(format!("event topic: {err}")));
                }
                if e.event.is_empty() {
                    return Err(DecodeError::InvalidShape("event type is empty".into()));
                }
                if e.id.is_empty() {
                    return Err(DecodeError::InvalidShape("event id is empty".into()));
                }
            }
            Self::Command(c) => {
                if c.command.is_empty() {
                    return Err(DecodeError::InvalidShape("command name is empty".into()));
                }
                if c.request_id.as_ref().is_some_and(RequestId::is_empty) {
                    return Err(DecodeError::InvalidShape("request_id is empty".into()));
                }
            }
            Self::Response(r) => {
                if r.command.is_empty() {
                    return Err(DecodeError::InvalidShape("response command is empty".into()));
                }
                if r.request_id.is_empty() {
                    return Err(DecodeError::InvalidShape("request_id is empty".into()));
                }
            }
        }
        Ok(())
    }
}

/// Current time truncated to the wire precision.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

/// Why a payload was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not UTF-8 text.
    #[error("payload is not UTF-8 text")]
    NotText,
    /// Payload is not JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// Payload is JSON but not an object.
    #[error("envelope is not a JSON object")]
    NotObject,
    /// No `type` discriminant, or it is not a string.
    #[error("missing type discriminant")]
    MissingType,
    /// `type` is not one of the three envelope kinds.
    #[error("unknown envelope type: {0}")]
    UnknownType(String),
    /// Fields missing, mistyped, or empty.
    #[error("invalid envelope shape: {0}")]
    InvalidShape(String),
}

impl From<DecodeError> for ProtocolError {
    fn from(err: DecodeError) -> Self {
        Self::MalformedEnvelope {
            reason: err.to_string(),
        }
    }
}

/// Serialize an envelope to its text form.
pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Decode a raw payload.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotText)?;
    decode_str(text)
}

/// Decode a text payload.
pub fn decode_str(text: &str) -> Result<Envelope, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(DecodeError::NotObject);
    };
    let Some(Value::String(kind)) = object.get("type") else {
        return Err(DecodeError::MissingType);
    };
    if ![KIND_EVENT, KIND_COMMAND, KIND_RESPONSE].contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind.clone()));
    }

    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| DecodeError::InvalidShape(e.to_string()))?;
    envelope.check_shape()?;
    Ok(envelope)
}
