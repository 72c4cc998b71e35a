//! Command names and their parameter shapes.
//!
//! Shared by the server's dispatch table and every client that issues
//! commands, so both sides agree on spelling and field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EventEnvelope;

/// Attach the connection to a topic.
pub const SUBSCRIBE: &str = "subscribe";
/// Detach the connection from a topic.
pub const UNSUBSCRIBE: &str = "unsubscribe";
/// Liveness probe issued by clients.
pub const PING: &str = "ping";
/// Response command name answering [`PING`].
pub const PONG: &str = "pong";
/// Events on a topic at or after a timestamp.
pub const HISTORY: &str = "history";

/// List visible entities.
pub const ENTITIES_LIST: &str = "entities.list";
/// Start an entity.
pub const ENTITIES_START: &str = "entities.start";
/// Stop an entity.
pub const ENTITIES_STOP: &str = "entities.stop";
/// Create an entity.
pub const ENTITIES_CREATE: &str = "entities.create";
/// Post a message into a conversation.
pub const CHAT_SEND: &str = "chat.send";
/// Read a conversation.
pub const CHAT_HISTORY: &str = "chat.history";
/// Read the public configuration view.
pub const CONFIG_GET: &str = "config.get";
/// Read the server's capability map.
pub const CAPABILITIES_GET: &str = "capabilities.get";
/// List cron jobs.
pub const CRON_LIST: &str = "cron.list";
/// Schedule a cron job.
pub const CRON_SCHEDULE: &str = "cron.schedule";
/// Remove a cron job.
pub const CRON_REMOVE: &str = "cron.remove";
/// List tenants.
pub const TENANTS_LIST: &str = "tenants.list";

/// Event type of the direct handshake notice on `system`.
pub const EVENT_CONNECTION_ESTABLISHED: &str = "connection.established";

/// Params for `subscribe` / `unsubscribe`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicParams {
    /// Raw topic string; validated by the receiver.
    pub topic: String,
}

/// Params for `history`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    /// Raw topic string.
    pub topic: String,
    /// Inclusive lower bound on event timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    /// Maximum events returned (newest are kept).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Result of `history`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryResult {
    /// Events in publication order.
    pub events: Vec<EventEnvelope>,
}

/// Params naming one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityParams {
    /// Entity id.
    pub id: String,
}

/// Params for `entities.create`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntityParams {
    /// Display name.
    pub name: String,
}

/// Params for `chat.send`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageParams {
    /// Conversation id.
    pub context: String,
    /// Message body.
    pub text: String,
}

/// Params for `chat.history`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryParams {
    /// Conversation id.
    pub context: String,
    /// Inclusive lower bound on item timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
}

/// Params for `cron.schedule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleParams {
    /// Entity whose conversation receives the prompt.
    pub entity_id: String,
    /// Firing period in seconds.
    pub every_secs: u64,
    /// Text posted on each firing.
    pub prompt: String,
}

/// Params for `cron.remove`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    /// Job id.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_params_accept_missing_bounds() {
        let params: HistoryParams = serde_json::from_value(json!({"topic": "chat:a"})).unwrap();
        assert!(params.after.is_none());
        assert!(params.limit.is_none());
    }

    #[test]
    fn schedule_params_use_camel_case() {
        let params: ScheduleParams = serde_json::from_value(json!({
            "entityId": "e1", "everySecs": 30, "prompt": "hi"
        }))
        .unwrap();
        assert_eq!(params.every_secs, 30);
    }
}
