//! Gap recovery after reconnect.
//!
//! When a connection drops, [`GapTracker`] records each conversational
//! topic's watermark. After the next handshake those recorded bounds (not
//! the live watermarks, which move as soon as new events arrive) are sent
//! to a [`RecoverySource`], and the results go through the same dedup path
//! as live events. Delivery is at-least-once on the wire and exactly-once
//! per listener within the dedup window.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use switchboard_core::commands::{HISTORY, HistoryResult};
use switchboard_core::envelope::EventEnvelope;
use switchboard_core::topic::Topic;
use tracing::{info, warn};

use crate::errors::Result;
use crate::listeners::{Delivery, ListenerRegistry};
use crate::requester::Requester;

/// Point-in-time query for missed events.
#[async_trait]
pub trait RecoverySource: Send + Sync {
    /// Events on `topic` with `timestamp >= after`, oldest first.
    async fn events_after(&self, topic: &Topic, after: DateTime<Utc>) -> Result<Vec<EventEnvelope>>;
}

/// Recovery through the server's `history` command.
#[derive(Clone, Debug)]
pub struct ServerHistory {
    requester: Requester,
}

impl ServerHistory {
    /// Query through `requester`.
    pub fn new(requester: Requester) -> Self {
        Self { requester }
    }
}

#[async_trait]
impl RecoverySource for ServerHistory {
    async fn events_after(&self, topic: &Topic, after: DateTime<Utc>) -> Result<Vec<EventEnvelope>> {
        let result: HistoryResult = self
            .requester
            .request_as(HISTORY, json!({ "topic": topic, "after": after }))
            .await?;
        Ok(result.events)
    }
}

/// Topics to query and the bound to query each from.
pub type RecoveryPlan = Vec<(Topic, DateTime<Utc>)>;

/// Current watermark of every conversational topic in `listeners`.
pub fn watermarks(listeners: &ListenerRegistry) -> RecoveryPlan {
    listeners
        .topics()
        .into_iter()
        .filter(Topic::is_conversational)
        .filter_map(|topic| {
            let after = listeners.watermark(&topic)?;
            Some((topic, after))
        })
        .collect()
}

/// Recovery bounds outstanding since the last disconnect.
///
/// A bound stays until a recovery pass queries it successfully, so a pass
/// cut short by another disconnect is retried from the original bound.
#[derive(Clone, Debug, Default)]
pub struct GapTracker {
    bounds: Arc<Mutex<BTreeMap<Topic, DateTime<Utc>>>>,
}

impl GapTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the watermarks in `listeners` as of a dropped connection.
    /// An older outstanding bound for a topic is kept.
    pub fn mark(&self, listeners: &ListenerRegistry) {
        let mut bounds = self.bounds.lock();
        for (topic, after) in watermarks(listeners) {
            let _ = bounds.entry(topic).or_insert(after);
        }
    }

    /// Outstanding bounds, in topic order.
    pub fn pending(&self) -> RecoveryPlan {
        self.bounds
            .lock()
            .iter()
            .map(|(topic, after)| (topic.clone(), *after))
            .collect()
    }

    /// Drop the bounds `report` shows were queried successfully.
    pub fn settle(&self, plan: &[(Topic, DateTime<Utc>)], report: &RecoveryReport) {
        let mut bounds = self.bounds.lock();
        for (topic, after) in plan {
            if !report.failed.contains(topic) && bounds.get(topic) == Some(after) {
                let _ = bounds.remove(topic);
            }
        }
    }
}

/// Outcome of one recovery pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Topics queried.
    pub topics: usize,
    /// Events returned by the source.
    pub fetched: usize,
    /// Events that were new to local listeners.
    pub recovered: usize,
    /// Events already delivered live.
    pub duplicates: usize,
    /// Topics whose query failed.
    pub failed: Vec<Topic>,
}

/// Runs recovery passes against one listener registry.
pub struct RecoveryCoordinator {
    source: Arc<dyn RecoverySource>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl RecoveryCoordinator {
    /// Recover from `source` into `listeners`.
    pub fn new(source: Arc<dyn RecoverySource>, listeners: Arc<Mutex<ListenerRegistry>>) -> Self {
        Self { source, listeners }
    }

    /// Conversational topics with listeners, bounded by their watermarks now.
    pub fn plan(&self) -> RecoveryPlan {
        watermarks(&self.listeners.lock())
    }

    /// Query every topic in `plan` from its bound and merge the results.
    pub async fn recover(&self, plan: RecoveryPlan) -> RecoveryReport {
        let mut report = RecoveryReport {
            topics: plan.len(),
            ..RecoveryReport::default()
        };

        for (topic, after) in plan {
            let events = match self.source.events_after(&topic, after).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(%topic, error = %e, "recovery query failed");
                    report.failed.push(topic);
                    continue;
                }
            };
            report.fetched += events.len();

            let mut listeners = self.listeners.lock();
            for event in events.iter().filter(|e| e.topic == topic) {
                match listeners.deliver(event) {
                    Delivery::Delivered(_) => report.recovered += 1,
                    Delivery::Duplicate => report.duplicates += 1,
                    Delivery::NoListeners => {}
                }
            }
        }

        info!(
            topics = report.topics,
            recovered = report.recovered,
            duplicates = report.duplicates,
            failed = report.failed.len(),
            "recovery pass complete"
        );
        report
    }
}
