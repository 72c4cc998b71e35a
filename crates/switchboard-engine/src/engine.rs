//! Engine facade.
//!
//! Every operation is a direct synchronous call. State changes are
//! announced through the configured [`EventSink`] so that both the server
//! fan-out and the local bus observe the same event stream.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchboard_core::envelope::EventEnvelope;
use switchboard_core::ids::EntityId;
use switchboard_core::topic::{Topic, TopicRegistry};
use switchboard_core::types::{ChatItem, ChatRole, Entity, EntityStatus, Tenant};
use switchboard_settings::EngineSettings;
use tracing::{debug, info};

use crate::chat::{ChatStore, EchoResponder, Responder};
use crate::directory::EntityDirectory;
use crate::errors::{EngineError, Result};
use crate::sink::EventSink;

/// Id of the single entity the local profile provides.
pub const LOCAL_ENTITY_ID: &str = "local";

/// What an engine instance offers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineProfile {
    /// Profile name (`server` or `local`).
    pub name: &'static str,
    /// Whether new entities may be created.
    pub multi_entity: bool,
    /// Whether entities are scoped to tenants.
    pub multi_tenant: bool,
    /// Directory size cap.
    pub max_entities: usize,
    /// Conversation items retained per context.
    pub history_limit: usize,
}

impl EngineProfile {
    /// Full-featured profile used behind the server.
    #[must_use]
    pub fn server(settings: &EngineSettings) -> Self {
        Self {
            name: "server",
            multi_entity: true,
            multi_tenant: !settings.tenants.is_empty(),
            max_entities: settings.max_entities,
            history_limit: settings.history_limit,
        }
    }

    /// Single-entity profile used in-process.
    #[must_use]
    pub fn local() -> Self {
        Self {
            name: "local",
            multi_entity: false,
            multi_tenant: false,
            max_entities: 1,
            history_limit: EngineSettings::default().history_limit,
        }
    }
}

/// A user message and the reply it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    /// The stored user item.
    pub message: ChatItem,
    /// The stored reply, if the responder produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ChatItem>,
}

/// The embedded compute module.
pub struct Engine {
    profile: EngineProfile,
    tenants: Vec<Tenant>,
    directory: EntityDirectory,
    chat: ChatStore,
    responder: Arc<dyn Responder>,
    sink: Arc<dyn EventSink>,
    topics: TopicRegistry,
}

impl Engine {
    /// Server-profile engine seeded from settings.
    pub fn server(settings: &EngineSettings, sink: Arc<dyn EventSink>) -> Self {
        let profile = EngineProfile::server(settings);
        let tenants = settings
            .tenants
            .iter()
            .map(|t| Tenant {
                id: t.id.clone(),
                name: t.name.clone(),
            })
            .collect();
        let engine = Self::with_profile(profile, tenants, sink);
        for seed in &settings.entities {
            let _ = engine
                .directory
                .insert(EntityId::new(), &seed.name, seed.tenant.clone());
        }
        engine
    }

    /// Local-profile engine with its single built-in entity.
    pub fn local(sink: Arc<dyn EventSink>) -> Self {
        let engine = Self::with_profile(EngineProfile::local(), Vec::new(), sink);
        let _ = engine
            .directory
            .insert(EntityId::from(LOCAL_ENTITY_ID), "Local agent", None);
        engine
    }

    fn with_profile(profile: EngineProfile, tenants: Vec<Tenant>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            chat: ChatStore::new(profile.history_limit),
            profile,
            tenants,
            directory: EntityDirectory::new(),
            responder: Arc::new(EchoResponder),
            sink,
            topics: TopicRegistry::standard(),
        }
    }

    /// Replace the reply producer.
    #[must_use]
    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = responder;
        self
    }

    /// Active profile.
    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    /// Emit an event through the sink.
    pub fn publish(&self, event: &EventEnvelope) -> usize {
        let reached = self.sink.publish(event);
        debug!(topic = %event.topic, event = %event.event, reached, "engine event published");
        reached
    }

    // ── Entities ────────────────────────────────────────────────────

    /// Entities visible to `tenant`.
    pub fn list_entities(&self, tenant: Option<&str>) -> Vec<Entity> {
        self.directory.list(tenant)
    }

    /// One visible entity.
    pub fn entity(&self, tenant: Option<&str>, id: &str) -> Result<Entity> {
        self.directory.get(tenant, id)
    }

    /// Start an entity; starting a running entity is a no-op.
    pub fn start_entity(&self, tenant: Option<&str>, id: &str) -> Result<Entity> {
        self.transition(tenant, id, EntityStatus::Running, "entity.started")
    }

    /// Stop an entity; stopping a stopped entity is a no-op.
    pub fn stop_entity(&self, tenant: Option<&str>, id: &str) -> Result<Entity> {
        self.transition(tenant, id, EntityStatus::Stopped, "entity.stopped")
    }

    fn transition(
        &self,
        tenant: Option<&str>,
        id: &str,
        status: EntityStatus,
        event: &str,
    ) -> Result<Entity> {
        let (previous, entity) = self.directory.transition(tenant, id, status)?;
        if previous != status {
            info!(entity_id = id, ?status, "entity status changed");
            self.announce_entity(event, &entity);
        }
        Ok(entity)
    }

    /// Register a new entity owned by `tenant`.
    pub fn create_entity(&self, tenant: Option<&str>, name: &str) -> Result<Entity> {
        if !self.profile.multi_entity {
            return Err(EngineError::Unsupported("entity creation"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidParams("entity name is empty".into()));
        }
        if self.directory.len() >= self.profile.max_entities {
            return Err(EngineError::LimitReached(self.profile.max_entities));
        }
        let entity = self
            .directory
            .insert(EntityId::new(), name, tenant.map(str::to_owned));
        info!(entity_id = %entity.id, name, "entity created");
        self.announce_entity("entity.created", &entity);
        Ok(entity)
    }

    fn announce_entity(&self, event: &str, entity: &Entity) {
        let data = serde_json::to_value(entity).unwrap_or(Value::Null);
        let _ = self.publish(&EventEnvelope::new(Topic::entities(), event, data.clone()));
        let _ = self.publish(&EventEnvelope::new(Topic::entity(entity.id.as_str()), event, data));
    }

    // ── Conversations ───────────────────────────────────────────────

    /// Post a user message and the responder's reply into `context`.
    pub fn send_message(&self, context: &str, text: &str) -> Result<ChatExchange> {
        let topic = self.chat_topic(context)?;
        if text.trim().is_empty() {
            return Err(EngineError::InvalidParams("message text is empty".into()));
        }
        let message = self.append_and_announce(&topic, context, ChatRole::User, text);
        let reply = self
            .responder
            .reply(context, text)
            .map(|reply| self.append_and_announce(&topic, context, ChatRole::Assistant, &reply));
        Ok(ChatExchange { message, reply })
    }

    /// Post a system notice into `context` (used by the scheduler).
    pub fn post_system(&self, context: &str, text: &str) -> Result<ChatItem> {
        let topic = self.chat_topic(context)?;
        Ok(self.append_and_announce(&topic, context, ChatRole::System, text))
    }

    /// Items of `context` at or after `after`.
    pub fn history(&self, context: &str, after: Option<DateTime<Utc>>) -> Result<Vec<ChatItem>> {
        let _ = self.chat_topic(context)?;
        Ok(self.chat.history(context, after))
    }

    fn chat_topic(&self, context: &str) -> Result<Topic> {
        self.topics
            .check(Topic::chat(context).as_str())
            .map_err(|e| EngineError::InvalidParams(e.to_string()))
    }

    fn append_and_announce(
        &self,
        topic: &Topic,
        context: &str,
        role: ChatRole,
        text: &str,
    ) -> ChatItem {
        let item = self.chat.append(context, role, text);
        let event = EventEnvelope {
            topic: topic.clone(),
            event: "message.created".to_owned(),
            data: serde_json::to_value(&item).unwrap_or(Value::Null),
            timestamp: item.timestamp,
            id: item.id.clone(),
        };
        let _ = self.publish(&event);
        item
    }

    // ── Config / tenants ────────────────────────────────────────────

    /// Public configuration view.
    pub fn config(&self) -> Value {
        json!({
            "profile": self.profile,
            "tenants": self.tenants,
            "entityCount": self.directory.len(),
        })
    }

    /// Known tenants.
    pub fn tenants(&self) -> Result<Vec<Tenant>> {
        if !self.profile.multi_tenant {
            return Err(EngineError::Unsupported("tenants"));
        }
        Ok(self.tenants.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use switchboard_settings::{EntitySeed, TenantSeed};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<EventEnvelope>>,
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: &EventEnvelope) -> usize {
            self.events.lock().push(event.clone());
            1
        }
    }

    impl RecordingSink {
        fn topics(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .map(|e| format!("{} {}", e.topic, e.event))
                .collect()
        }
    }

    fn server_engine() -> (Engine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let settings = EngineSettings {
            tenants: vec![TenantSeed {
                id: "acme".into(),
                name: "Acme".into(),
            }],
            entities: vec![
                EntitySeed {
                    name: "alpha".into(),
                    tenant: Some("acme".into()),
                },
                EntitySeed {
                    name: "beta".into(),
                    tenant: Some("globex".into()),
                },
            ],
            max_entities: 3,
            history_limit: 100,
        };
        (Engine::server(&settings, sink.clone()), sink)
    }

    #[test]
    fn local_profile_has_one_entity_and_no_creation() {
        let engine = Engine::local(Arc::new(crate::sink::NullSink));
        let entities = engine.list_entities(None);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id.as_str(), LOCAL_ENTITY_ID);
        assert_matches!(engine.create_entity(None, "x"), Err(EngineError::Unsupported(_)));
        assert_matches!(engine.tenants(), Err(EngineError::Unsupported(_)));
    }

    #[test]
    fn start_publishes_once_per_change() {
        let (engine, sink) = server_engine();
        let id = engine.list_entities(Some("acme"))[0].id.clone();

        let entity = engine.start_entity(None, id.as_str()).unwrap();
        assert_eq!(entity.status, EntityStatus::Running);
        let _ = engine.start_entity(None, id.as_str()).unwrap();

        assert_eq!(
            sink.topics(),
            vec![
                "entities entity.started".to_string(),
                format!("entity:{id} entity.started"),
            ]
        );
    }

    #[test]
    fn create_respects_limit() {
        let (engine, _) = server_engine();
        let created = engine.create_entity(Some("acme"), "gamma").unwrap();
        assert_eq!(created.tenant.as_deref(), Some("acme"));
        assert_matches!(engine.create_entity(None, "delta"), Err(EngineError::LimitReached(3)));
    }

    #[test]
    fn create_rejects_blank_name() {
        let (engine, _) = server_engine();
        assert_matches!(engine.create_entity(None, "  "), Err(EngineError::InvalidParams(_)));
    }

    #[test]
    fn send_message_publishes_items_with_matching_ids() {
        let (engine, sink) = server_engine();
        let exchange = engine.send_message("session-42", "hello").unwrap();
        let reply = exchange.reply.unwrap();
        assert_eq!(reply.text, "ack: hello");

        let events = sink.events.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].topic, Topic::chat("session-42"));
        assert_eq!(events[0].id, exchange.message.id);
        assert_eq!(events[0].timestamp, exchange.message.timestamp);
        assert_eq!(events[1].id, reply.id);

        assert_eq!(engine.history("session-42", None).unwrap().len(), 2);
    }

    #[test]
    fn send_message_validates_context_and_text() {
        let (engine, _) = server_engine();
        assert_matches!(engine.send_message("bad context", "x"), Err(EngineError::InvalidParams(_)));
        assert_matches!(engine.send_message("ok", " "), Err(EngineError::InvalidParams(_)));
    }

    #[test]
    fn config_reports_profile() {
        let (engine, _) = server_engine();
        let config = engine.config();
        assert_eq!(config["profile"]["name"], "server");
        assert_eq!(config["profile"]["multiTenant"], true);
        assert_eq!(config["entityCount"], 2);
        assert_eq!(engine.tenants().unwrap().len(), 1);
    }

    struct Silent;
    impl Responder for Silent {
        fn reply(&self, _: &str, _: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn custom_responder() {
        let engine = Engine::local(Arc::new(crate::sink::NullSink)).with_responder(Arc::new(Silent));
        let exchange = engine.send_message("c", "hi").unwrap();
        assert!(exchange.reply.is_none());
    }
}
