//! In-process backend.
//!
//! Operations are direct calls into a local-profile [`Engine`]. Events the
//! engine emits are fanned out by a [`LocalBus`] to subscriptions created
//! here; there is no network hop and nothing to reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use switchboard_core::capabilities::{Capability, CapabilitySet};
use switchboard_core::envelope::EventEnvelope;
use switchboard_core::subscription::{Disposer, Subscription};
use switchboard_core::topic::{Topic, TopicError, TopicRegistry};
use switchboard_core::types::{ChatItem, Entity};
use switchboard_engine::{ChatExchange, Engine, EventSink, Responder};
use switchboard_settings::ClientSettings;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendKind, BackendStatus, CronOps, TenantOps};
use crate::errors::Result;

type Listeners = HashMap<Topic, Vec<(u64, mpsc::Sender<EventEnvelope>)>>;

/// Topic fan-out inside one process.
pub struct LocalBus {
    capacity: usize,
    topics: TopicRegistry,
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
}

impl LocalBus {
    /// Bus buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: TopicRegistry::standard(),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Listen on `raw` after validating it.
    pub fn subscribe(self: &Arc<Self>, raw: &str) -> std::result::Result<Subscription, TopicError> {
        let topic = self.topics.check(raw)?;
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(topic.clone())
            .or_default()
            .push((id, tx));
        debug!(%topic, listener = id, "local listener attached");

        let bus: Weak<Self> = Arc::downgrade(self);
        let detach_topic = topic.clone();
        let disposer = Disposer::new(move || {
            if let Some(bus) = bus.upgrade() {
                bus.detach(&detach_topic, id);
            }
        });
        Ok(Subscription::new(topic, rx, disposer))
    }

    fn detach(&self, topic: &Topic, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(list) = listeners.get_mut(topic) {
            list.retain(|(lid, _)| *lid != id);
            if list.is_empty() {
                let _ = listeners.remove(topic);
            }
        }
    }

    /// Listeners on `topic`.
    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.listeners.lock().get(topic).map_or(0, Vec::len)
    }
}

impl EventSink for LocalBus {
    fn publish(&self, event: &EventEnvelope) -> usize {
        let listeners = self.listeners.lock();
        let Some(list) = listeners.get(&event.topic) else {
            return 0;
        };
        let mut reached = 0;
        for (id, tx) in list {
            match tx.try_send(event.clone()) {
                Ok(()) => reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic = %event.topic, listener = id, "local listener full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        reached
    }
}

/// Backend over an in-process engine.
pub struct LocalBackend {
    engine: Engine,
    bus: Arc<LocalBus>,
    capabilities: CapabilitySet,
}

impl LocalBackend {
    /// Local backend with default listener buffering.
    pub fn new() -> Self {
        Self::from_settings(&ClientSettings::default())
    }

    /// Local backend buffering `settings.listener_capacity` events per listener.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let bus = Arc::new(LocalBus::new(settings.listener_capacity));
        let engine = Engine::local(bus.clone());
        Self {
            engine,
            bus,
            capabilities: BackendKind::Local.static_capabilities(),
        }
    }

    /// Replace the engine's reply producer.
    #[must_use]
    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.engine = self.engine.with_responder(responder);
        self
    }

    /// The event bus, for inspection.
    pub fn bus(&self) -> &Arc<LocalBus> {
        &self.bus
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn status(&self) -> BackendStatus {
        BackendStatus::Ready
    }

    async fn list_entities(&self) -> Result<Vec<Entity>> {
        self.ensure(Capability::Entities)?;
        Ok(self.engine.list_entities(None))
    }

    async fn start_entity(&self, id: &str) -> Result<Entity> {
        self.ensure(Capability::Entities)?;
        Ok(self.engine.start_entity(None, id)?)
    }

    async fn stop_entity(&self, id: &str) -> Result<Entity> {
        self.ensure(Capability::Entities)?;
        Ok(self.engine.stop_entity(None, id)?)
    }

    async fn create_entity(&self, name: &str) -> Result<Entity> {
        self.ensure(Capability::MultiEntity)?;
        Ok(self.engine.create_entity(None, name)?)
    }

    async fn send_message(&self, context: &str, text: &str) -> Result<ChatExchange> {
        self.ensure(Capability::Chat)?;
        Ok(self.engine.send_message(context, text)?)
    }

    async fn history(&self, context: &str, after: Option<DateTime<Utc>>) -> Result<Vec<ChatItem>> {
        self.ensure(Capability::Chat)?;
        Ok(self.engine.history(context, after)?)
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        self.ensure(Capability::Subscriptions)?;
        Ok(self.bus.subscribe(topic)?)
    }

    async fn config(&self) -> Result<Value> {
        self.ensure(Capability::Config)?;
        let mut config = self.engine.config();
        if let Some(obj) = config.as_object_mut() {
            let _ = obj.insert(
                "capabilities".into(),
                serde_json::to_value(&self.capabilities).unwrap_or(Value::Null),
            );
        }
        Ok(config)
    }

    fn cron(&self) -> Option<&dyn CronOps> {
        None
    }

    fn tenants(&self) -> Option<&dyn TenantOps> {
        None
    }
}
