//! Connection registry and topic fan-out.
//!
//! The hub is the single owner of every [`ClientConnection`]. Subscription
//! changes go through it; `publish` takes a read lock, serializes the event
//! once and pushes the shared frame into each subscriber's queue. Pushing
//! never waits, so one slow consumer cannot stall publishers.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde_json::Value;
use switchboard_core::envelope::{self, Envelope, EventEnvelope, ResponseEnvelope};
use switchboard_core::ids::ConnectionId;
use switchboard_core::topic::{TENANT_PREFIX, Topic, TopicKind, TopicRegistry};
use switchboard_core::types::Principal;
use switchboard_engine::EventSink;
use switchboard_settings::BackpressurePolicy;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::journal::Journal;
use super::queue::{CloseReason, PushOutcome};
use crate::errors::HubError;
use crate::metrics::{
    EVENTS_DELIVERED_TOTAL, EVENTS_DROPPED_TOTAL, EVENTS_PUBLISHED_TOTAL, SUBSCRIPTIONS_ACTIVE,
};

/// Outcome of one [`SubscriptionHub::publish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the event.
    pub delivered: usize,
    /// Subscribers that lost an event (this one or an older one).
    pub dropped: usize,
    /// Subscribers closed for overflow.
    pub disconnected: usize,
}

/// Owns connections and their subscription sets.
pub struct SubscriptionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    registry: TopicRegistry,
    journal: Arc<Journal>,
    queue_capacity: usize,
    policy: BackpressurePolicy,
}

impl SubscriptionHub {
    /// Hub with the standard topic grammar.
    pub fn new(queue_capacity: usize, policy: BackpressurePolicy, journal: Arc<Journal>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            registry: TopicRegistry::standard(),
            journal,
            queue_capacity,
            policy,
        }
    }

    /// Replace the topic grammar.
    #[must_use]
    pub fn with_registry(mut self, registry: TopicRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The event journal fed by `publish`.
    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    /// The topic grammar.
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Create a connection in the `Connecting` state.
    pub fn register(&self, principal: Principal) -> Arc<ClientConnection> {
        let conn = self.connection_for(principal);
        let _ = self
            .connections
            .write()
            .insert(conn.id.clone(), conn.clone());
        debug!(conn_id = %conn.id, subject = %conn.principal.subject, "connection registered");
        conn
    }

    /// Register unless `limit` connections are already held.
    ///
    /// The count and the insert happen under one write lock, so concurrent
    /// handshakes cannot overshoot the limit.
    pub fn try_register(&self, principal: Principal, limit: usize) -> Option<Arc<ClientConnection>> {
        let mut connections = self.connections.write();
        if connections.len() >= limit {
            return None;
        }
        let conn = self.connection_for(principal);
        let _ = connections.insert(conn.id.clone(), conn.clone());
        drop(connections);
        debug!(conn_id = %conn.id, subject = %conn.principal.subject, "connection registered");
        Some(conn)
    }

    fn connection_for(&self, principal: Principal) -> Arc<ClientConnection> {
        Arc::new(ClientConnection::new(
            ConnectionId::new(),
            principal,
            self.queue_capacity,
            self.policy,
        ))
    }

    /// Move a connection to `Open`.
    pub fn open(&self, id: &ConnectionId) -> Result<(), HubError> {
        let conn = self.get(id)?;
        let _ = conn.mark_open();
        Ok(())
    }

    /// Look up a live connection.
    pub fn get(&self, id: &ConnectionId) -> Result<Arc<ClientConnection>, HubError> {
        self.connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::UnknownConnection(id.to_string()))
    }

    /// Add `raw` to the connection's set. Succeeds if already subscribed.
    pub fn subscribe(&self, id: &ConnectionId, raw: &str) -> Result<Topic, HubError> {
        let conn = self.get(id)?;
        let topic = self.check_topic(&conn.principal, raw)?;
        if conn.subscribe(topic.clone()) {
            gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
            debug!(conn_id = %id, topic = %topic, "subscribed");
        }
        Ok(topic)
    }

    /// Validate `raw` and check that `principal` may read it.
    pub fn check_topic(&self, principal: &Principal, raw: &str) -> Result<Topic, HubError> {
        let topic = self.registry.check(raw)?;
        if let TopicKind::Scoped {
            prefix: TENANT_PREFIX,
            instance,
        } = topic.kind()
        {
            if !principal.can_see(Some(instance)) {
                return Err(HubError::Forbidden(topic.to_string()));
            }
        }
        Ok(topic)
    }

    /// Remove `raw` from the connection's set. Succeeds if absent.
    pub fn unsubscribe(&self, id: &ConnectionId, raw: &str) -> Result<Topic, HubError> {
        let topic = self.registry.check(raw)?;
        let conn = self.get(id)?;
        if conn.unsubscribe(&topic) {
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
            debug!(conn_id = %id, topic = %topic, "unsubscribed");
        }
        Ok(topic)
    }

    /// Topics the connection is subscribed to.
    pub fn subscriptions_of(&self, id: &ConnectionId) -> Result<Vec<Topic>, HubError> {
        Ok(self.get(id)?.subscriptions())
    }

    /// Fan `event` out to every open subscriber of its topic.
    pub fn publish(&self, event: &EventEnvelope) -> PublishReport {
        counter!(EVENTS_PUBLISHED_TOTAL).increment(1);
        self.journal.record(event);

        let frame: Arc<str> = match envelope::encode(&Envelope::Event(event.clone())) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(topic = %event.topic, event = %event.event, error = %e, "failed to encode event");
                return PublishReport::default();
            }
        };

        let mut report = PublishReport::default();
        let mut overflowed = Vec::new();
        {
            let conns = self.connections.read();
            for conn in conns.values() {
                if !conn.is_open() || !conn.is_subscribed(&event.topic) {
                    continue;
                }
                match conn.send_event(frame.clone()) {
                    PushOutcome::Queued => report.delivered += 1,
                    PushOutcome::DroppedOldest => {
                        report.delivered += 1;
                        report.dropped += 1;
                    }
                    PushOutcome::DroppedNewest => report.dropped += 1,
                    PushOutcome::Overflow => overflowed.push(conn.id.clone()),
                    PushOutcome::Closed => {}
                }
            }
        }

        for id in &overflowed {
            warn!(conn_id = %id, topic = %event.topic, "outbound queue overflow, disconnecting");
            if self.close(id, CloseReason::Backpressure) {
                report.disconnected += 1;
            }
        }

        counter!(EVENTS_DELIVERED_TOTAL).increment(report.delivered as u64);
        if report.dropped > 0 {
            counter!(EVENTS_DROPPED_TOTAL).increment(report.dropped as u64);
            debug!(topic = %event.topic, dropped = report.dropped, "events dropped for slow consumers");
        }
        report
    }

    /// Queue a response for one connection. A full reply lane closes it.
    pub fn send_reply(&self, id: &ConnectionId, response: &ResponseEnvelope) -> bool {
        let Ok(conn) = self.get(id) else {
            return false;
        };
        let frame: Arc<str> = match envelope::encode(&Envelope::Response(response.clone())) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(conn_id = %id, command = %response.command, error = %e, "failed to encode response");
                return false;
            }
        };
        match conn.send_reply(frame) {
            PushOutcome::Queued => true,
            PushOutcome::Overflow => {
                warn!(conn_id = %id, "reply queue overflow, disconnecting");
                let _ = self.close(id, CloseReason::Backpressure);
                false
            }
            _ => false,
        }
    }

    /// Send one event to one connection, bypassing subscriptions.
    pub fn send_direct(&self, id: &ConnectionId, event: &EventEnvelope) -> bool {
        let Ok(conn) = self.get(id) else {
            return false;
        };
        match envelope::encode(&Envelope::Event(event.clone())) {
            Ok(json) => matches!(conn.send_event(Arc::from(json)), PushOutcome::Queued),
            Err(_) => false,
        }
    }

    /// Tear a connection down: drop it from the registry, clear its
    /// subscriptions and queue its close frame.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn close(&self, id: &ConnectionId, reason: CloseReason) -> bool {
        let Some(conn) = self.connections.write().remove(id) else {
            return false;
        };
        let subs = conn.subscriptions().len();
        let _ = conn.close(reason);
        if subs > 0 {
            #[allow(clippy::cast_precision_loss)]
            let subs = subs as f64;
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(subs);
        }
        info!(conn_id = %id, reason = reason.as_str(), "connection closed");
        true
    }

    /// Close every connection.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        self.connection_ids()
            .iter()
            .filter(|id| self.close(id, reason))
            .count()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Ids of registered connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }

    /// Snapshot of registered connections.
    pub fn connections(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Connections currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.connections
            .read()
            .values()
            .filter(|c| c.is_subscribed(topic))
            .count()
    }

    /// Summary for `/health`.
    pub fn stats(&self) -> Value {
        let conns = self.connections.read();
        let subscriptions: usize = conns.values().map(|c| c.subscriptions().len()).sum();
        serde_json::json!({
            "connections": conns.len(),
            "subscriptions": subscriptions,
            "journalTopics": self.journal.topic_count(),
        })
    }
}

impl EventSink for SubscriptionHub {
    fn publish(&self, event: &EventEnvelope) -> usize {
        SubscriptionHub::publish(self, event).delivered
    }
}
