//! Domain payloads carried in envelope `data` fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, EventId, JobId};

/// Lifecycle state of a managed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Registered, never started.
    Idle,
    /// Running.
    Running,
    /// Stopped after running.
    Stopped,
}

/// A managed entity (an agent instance).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Identity.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub status: EntityStatus,
    /// Owning tenant; `None` for single-tenant deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Author of a conversation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Human input.
    User,
    /// Entity reply.
    Assistant,
    /// Scheduler or system notice.
    System,
}

/// One item in a conversational context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatItem {
    /// Identity; equal to the id of the event that announced it.
    pub id: EventId,
    /// Conversation id (the instance part of `chat:<context>`).
    pub context: String,
    /// Author.
    pub role: ChatRole,
    /// Message body.
    pub text: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// A recurring scheduled prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// Identity.
    pub id: JobId,
    /// Entity whose conversation receives the prompt.
    pub entity_id: EntityId,
    /// Firing period in seconds.
    pub every_secs: u64,
    /// Text posted on each firing.
    pub prompt: String,
    /// Number of completed firings.
    pub runs: u64,
    /// Time of the most recent firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

/// A tenant in a multi-tenant deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Identity.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Authenticated identity bound to a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Subject name from the credential grant.
    pub subject: String,
    /// Tenant scope; `None` sees every tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl Principal {
    /// Principal without a tenant scope.
    #[must_use]
    pub fn unscoped(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            tenant: None,
        }
    }

    /// Whether this principal may see something owned by `tenant`.
    #[must_use]
    pub fn can_see(&self, tenant: Option<&str>) -> bool {
        match (&self.tenant, tenant) {
            (None, _) | (_, None) => true,
            (Some(mine), Some(theirs)) => mine == theirs,
        }
    }
}
