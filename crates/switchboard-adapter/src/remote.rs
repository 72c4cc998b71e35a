//! Backend over a Switchboard server.
//!
//! Every operation is a correlated command through the reconnecting
//! [`Client`]. The capability map is negotiated once at construction and
//! frozen; a client that gives up is reported as [`BackendStatus::Fatal`]
//! and is never replaced behind the caller's back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use switchboard_client::{Client, ClientState};
use switchboard_core::capabilities::{Capability, CapabilitySet};
use switchboard_core::commands;
use switchboard_core::subscription::Subscription;
use switchboard_core::types::{ChatItem, CronJob, Entity, Tenant};
use switchboard_engine::ChatExchange;
use switchboard_settings::ClientSettings;
use tracing::{info, warn};

use crate::backend::{Backend, BackendKind, BackendStatus, CronOps, TenantOps};
use crate::errors::Result;

#[derive(Deserialize)]
struct EntityList {
    entities: Vec<Entity>,
}

#[derive(Deserialize)]
struct ItemList {
    items: Vec<ChatItem>,
}

#[derive(Deserialize)]
struct JobList {
    jobs: Vec<CronJob>,
}

#[derive(Deserialize)]
struct TenantList {
    tenants: Vec<Tenant>,
}

/// Backend talking to a server.
pub struct RemoteBackend {
    client: Client,
    capabilities: CapabilitySet,
}

impl RemoteBackend {
    /// Start a client for `settings` and negotiate capabilities.
    pub async fn connect(settings: ClientSettings) -> Self {
        info!(url = %settings.url, "connecting remote backend");
        Self::with_client(Client::start(settings)).await
    }

    /// Wrap a started client and negotiate capabilities.
    ///
    /// The server's map is intersected with the remote static map. If the
    /// server cannot be asked, the static map is used as is, unless the
    /// client has already failed for good, in which case every flag is off.
    pub async fn with_client(client: Client) -> Self {
        let fixed = BackendKind::Remote.static_capabilities();
        let capabilities = match client
            .request_as::<CapabilitySet>(commands::CAPABILITIES_GET, json!({}))
            .await
        {
            Ok(server) => fixed.intersect(&server),
            Err(e) if client.state().is_terminal() => {
                warn!(error = %e, "client failed before negotiation, disabling all capabilities");
                CapabilitySet::none()
            }
            Err(e) => {
                warn!(error = %e, "capability negotiation failed, using static map");
                fixed
            }
        };
        info!(
            capabilities = ?capabilities.enabled().collect::<Vec<_>>(),
            "remote capabilities frozen"
        );
        Self {
            client,
            capabilities,
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, data: Value) -> Result<T> {
        Ok(self.client.request_as(command, data).await?)
    }
}

/// Map the transport state onto a renderable status.
pub fn status_of(state: &ClientState) -> BackendStatus {
    match state {
        ClientState::Connected => BackendStatus::Ready,
        ClientState::Disconnected | ClientState::Connecting { attempt: 0 } => {
            BackendStatus::Connecting
        }
        ClientState::Connecting { attempt } => BackendStatus::Reconnecting {
            attempt: *attempt,
            reason: String::new(),
        },
        ClientState::Backoff {
            attempt, reason, ..
        } => BackendStatus::Reconnecting {
            attempt: *attempt,
            reason: reason.clone(),
        },
        ClientState::Failed { reason } => BackendStatus::Fatal {
            reason: reason.clone(),
        },
        ClientState::Closed => BackendStatus::Fatal {
            reason: "client closed".into(),
        },
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn status(&self) -> BackendStatus {
        status_of(&self.client.state())
    }

    async fn list_entities(&self) -> Result<Vec<Entity>> {
        self.ensure(Capability::Entities)?;
        let list: EntityList = self.call(commands::ENTITIES_LIST, json!({})).await?;
        Ok(list.entities)
    }

    async fn start_entity(&self, id: &str) -> Result<Entity> {
        self.ensure(Capability::Entities)?;
        self.call(commands::ENTITIES_START, json!({ "id": id })).await
    }

    async fn stop_entity(&self, id: &str) -> Result<Entity> {
        self.ensure(Capability::Entities)?;
        self.call(commands::ENTITIES_STOP, json!({ "id": id })).await
    }

    async fn create_entity(&self, name: &str) -> Result<Entity> {
        self.ensure(Capability::MultiEntity)?;
        self.call(commands::ENTITIES_CREATE, json!({ "name": name }))
            .await
    }

    async fn send_message(&self, context: &str, text: &str) -> Result<ChatExchange> {
        self.ensure(Capability::Chat)?;
        self.call(commands::CHAT_SEND, json!({ "context": context, "text": text }))
            .await
    }

    async fn history(&self, context: &str, after: Option<DateTime<Utc>>) -> Result<Vec<ChatItem>> {
        self.ensure(Capability::Chat)?;
        let mut params = json!({ "context": context });
        if let Some(after) = after {
            params["after"] = json!(after);
        }
        let list: ItemList = self.call(commands::CHAT_HISTORY, params).await?;
        Ok(list.items)
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        self.ensure(Capability::Subscriptions)?;
        Ok(self.client.subscribe(topic).await?)
    }

    async fn config(&self) -> Result<Value> {
        self.ensure(Capability::Config)?;
        self.call(commands::CONFIG_GET, json!({})).await
    }

    fn cron(&self) -> Option<&dyn CronOps> {
        self.capabilities
            .supports(Capability::Cron)
            .then_some(self as &dyn CronOps)
    }

    fn tenants(&self) -> Option<&dyn TenantOps> {
        self.capabilities
            .supports(Capability::MultiTenant)
            .then_some(self as &dyn TenantOps)
    }
}

#[async_trait]
impl CronOps for RemoteBackend {
    async fn list_jobs(&self) -> Result<Vec<CronJob>> {
        self.ensure(Capability::Cron)?;
        let list: JobList = self.call(commands::CRON_LIST, json!({})).await?;
        Ok(list.jobs)
    }

    async fn schedule(&self, entity_id: &str, every_secs: u64, prompt: &str) -> Result<CronJob> {
        self.ensure(Capability::Cron)?;
        self.call(
            commands::CRON_SCHEDULE,
            json!({ "entityId": entity_id, "everySecs": every_secs, "prompt": prompt }),
        )
        .await
    }

    async fn remove_job(&self, id: &str) -> Result<CronJob> {
        self.ensure(Capability::Cron)?;
        self.call(commands::CRON_REMOVE, json!({ "id": id })).await
    }
}

#[async_trait]
impl TenantOps for RemoteBackend {
    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.ensure(Capability::MultiTenant)?;
        let list: TenantList = self.call(commands::TENANTS_LIST, json!({})).await?;
        Ok(list.tenants)
    }
}
