//! The backend trait every dashboard surface talks to.
//!
//! Two implementations exist: [`RemoteBackend`](crate::RemoteBackend) over
//! the reconnecting client and [`LocalBackend`](crate::LocalBackend) over an
//! in-process engine. Callers consult [`Backend::capabilities`] before
//! offering an operation; an operation whose flag is off fails with
//! [`AdapterError::Unsupported`] without being attempted.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::capabilities::{Capability, CapabilitySet};
use switchboard_core::subscription::Subscription;
use switchboard_core::types::{ChatItem, CronJob, Entity, Tenant};
use switchboard_engine::ChatExchange;

use crate::errors::{AdapterError, Result};

/// Which variant is behind a [`Backend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A Switchboard server over WebSocket.
    Remote,
    /// The embedded engine in this process.
    Local,
}

impl BackendKind {
    /// The variant's fixed capability map.
    ///
    /// A remote backend narrows this further by what the server reports.
    #[must_use]
    pub fn static_capabilities(self) -> CapabilitySet {
        match self {
            Self::Remote => CapabilitySet::full(),
            Self::Local => CapabilitySet::with(&[
                Capability::Entities,
                Capability::Chat,
                Capability::Subscriptions,
                Capability::Config,
            ]),
        }
    }

    /// Display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renderable health of a backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendStatus {
    /// Operations are served.
    Ready,
    /// First connection still in progress.
    Connecting,
    /// The link dropped and is being re-established.
    Reconnecting {
        /// Consecutive failed attempts.
        attempt: u32,
        /// Why the last connection ended.
        reason: String,
    },
    /// The backend is unusable until the application restarts it.
    Fatal {
        /// Why.
        reason: String,
    },
}

impl BackendStatus {
    /// Whether a restart is required.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// The dashboard's view of a backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// The frozen capability map.
    fn capabilities(&self) -> &CapabilitySet;

    /// Current health.
    fn status(&self) -> BackendStatus;

    /// Fail with [`AdapterError::Unsupported`] unless `capability` is on.
    fn ensure(&self, capability: Capability) -> Result<()> {
        if self.capabilities().supports(capability) {
            Ok(())
        } else {
            Err(AdapterError::Unsupported { capability })
        }
    }

    /// Entities visible to this session.
    async fn list_entities(&self) -> Result<Vec<Entity>>;

    /// Start an entity.
    async fn start_entity(&self, id: &str) -> Result<Entity>;

    /// Stop an entity.
    async fn stop_entity(&self, id: &str) -> Result<Entity>;

    /// Register another entity. Needs [`Capability::MultiEntity`].
    async fn create_entity(&self, name: &str) -> Result<Entity>;

    /// Post a message into a conversation.
    async fn send_message(&self, context: &str, text: &str) -> Result<ChatExchange>;

    /// Items of a conversation at or after `after`.
    async fn history(&self, context: &str, after: Option<DateTime<Utc>>) -> Result<Vec<ChatItem>>;

    /// Listen on a topic. Dropping the handle unsubscribes.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// Public configuration view.
    async fn config(&self) -> Result<Value>;

    /// Scheduler operations, when [`Capability::Cron`] is on.
    fn cron(&self) -> Option<&dyn CronOps>;

    /// Tenant operations, when [`Capability::MultiTenant`] is on.
    fn tenants(&self) -> Option<&dyn TenantOps>;
}

/// Background scheduling.
#[async_trait]
pub trait CronOps: Send + Sync {
    /// Every job.
    async fn list_jobs(&self) -> Result<Vec<CronJob>>;

    /// Post `prompt` into the entity's conversation every `every_secs`.
    async fn schedule(&self, entity_id: &str, every_secs: u64, prompt: &str) -> Result<CronJob>;

    /// Remove a job, returning it.
    async fn remove_job(&self, id: &str) -> Result<CronJob>;
}

/// Tenant directory.
#[async_trait]
pub trait TenantOps: Send + Sync {
    /// Tenants this session may see.
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn backend_is_object_safe() {
        fn assert_object_safe(_: &dyn Backend) {}
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Backend>();
        let _ = assert_object_safe;
    }

    #[test]
    fn remote_static_map_is_full() {
        let caps = BackendKind::Remote.static_capabilities();
        assert!(Capability::ALL.iter().all(|c| caps.supports(*c)));
    }

    #[test]
    fn local_static_map_excludes_server_only_features() {
        let caps = BackendKind::Local.static_capabilities();
        for on in [
            Capability::Entities,
            Capability::Chat,
            Capability::Subscriptions,
            Capability::Config,
        ] {
            assert!(caps.supports(on), "{on} should be on");
        }
        for off in [
            Capability::MultiEntity,
            Capability::Cron,
            Capability::MultiTenant,
            Capability::Recovery,
        ] {
            assert!(!caps.supports(off), "{off} should be off");
        }
    }

    #[test]
    fn status_serializes_with_tag() {
        let status = BackendStatus::Reconnecting {
            attempt: 2,
            reason: "idle timeout".into(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "reconnecting");
        assert_eq!(value["attempt"], 2);
        assert!(BackendStatus::Fatal { reason: "x".into() }.is_fatal());
        assert_matches!(
            serde_json::to_value(BackendStatus::Ready).unwrap()["status"].as_str(),
            Some("ready")
        );
    }
}
