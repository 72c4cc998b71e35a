//! Local listener registry.
//!
//! Both live delivery and gap recovery feed events through
//! [`ListenerRegistry::deliver`], which drops any event whose id was
//! already seen on that topic. Each topic also keeps a watermark: the
//! newest timestamp delivered (or the attach time, if nothing arrived yet),
//! used as the inclusive `after` bound when recovering.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use switchboard_core::envelope::{EventEnvelope, now_millis};
use switchboard_core::ids::EventId;
use switchboard_core::topic::Topic;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Identifies one attached listener.
pub type ListenerId = u64;

/// What happened to a delivered event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to this many listeners.
    Delivered(usize),
    /// Already seen on this topic; dropped.
    Duplicate,
    /// Nobody listens on the topic.
    NoListeners,
}

/// Bounded FIFO of recently seen event ids.
#[derive(Debug)]
struct SeenIds {
    order: VecDeque<EventId>,
    set: HashSet<EventId>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(64)),
            set: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`; `false` if it was already present.
    fn insert(&mut self, id: &EventId) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                let _ = self.set.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        let _ = self.set.insert(id.clone());
        true
    }
}

#[derive(Debug)]
struct TopicListeners {
    listeners: Vec<(ListenerId, mpsc::Sender<EventEnvelope>)>,
    seen: SeenIds,
    watermark: DateTime<Utc>,
}

/// Every local listener, grouped by topic.
#[derive(Debug)]
pub struct ListenerRegistry {
    next_id: ListenerId,
    capacity: usize,
    dedup_window: usize,
    topics: HashMap<Topic, TopicListeners>,
}

impl ListenerRegistry {
    /// `capacity` events buffered per listener, `dedup_window` ids
    /// remembered per topic.
    pub fn new(capacity: usize, dedup_window: usize) -> Self {
        Self {
            next_id: 1,
            capacity: capacity.max(1),
            dedup_window,
            topics: HashMap::new(),
        }
    }

    /// Attach a listener. The flag is `true` when it is the first on its
    /// topic, i.e. the server must be told.
    pub fn attach(&mut self, topic: &Topic) -> (ListenerId, mpsc::Receiver<EventEnvelope>, bool) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = mpsc::channel(self.capacity);

        let first = !self.topics.contains_key(topic);
        let entry = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| TopicListeners {
                listeners: Vec::new(),
                seen: SeenIds::new(self.dedup_window),
                watermark: now_millis(),
            });
        entry.listeners.push((id, tx));
        (id, rx, first)
    }

    /// Detach a listener. `true` when it was the last on its topic.
    pub fn detach(&mut self, topic: &Topic, id: ListenerId) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        entry.listeners.retain(|(lid, _)| *lid != id);
        if entry.listeners.is_empty() {
            let _ = self.topics.remove(topic);
            return true;
        }
        false
    }

    /// Fan an event out to the topic's listeners unless it is a duplicate.
    ///
    /// A listener whose buffer is full misses the event.
    pub fn deliver(&mut self, event: &EventEnvelope) -> Delivery {
        let Some(entry) = self.topics.get_mut(&event.topic) else {
            return Delivery::NoListeners;
        };
        if !entry.seen.insert(&event.id) {
            debug!(topic = %event.topic, event_id = %event.id, "dropping duplicate event");
            return Delivery::Duplicate;
        }
        if event.timestamp > entry.watermark {
            entry.watermark = event.timestamp;
        }

        let mut delivered = 0;
        for (id, tx) in &entry.listeners {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(topic = %event.topic, listener = id, "listener buffer full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Delivery::Delivered(delivered)
    }

    /// Topics with at least one listener.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether anyone listens on `topic`.
    pub fn is_active(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic)
    }

    /// Inclusive lower bound for recovering `topic`.
    pub fn watermark(&self, topic: &Topic) -> Option<DateTime<Utc>> {
        self.topics.get(topic).map(|entry| entry.watermark)
    }

    /// Number of listeners on `topic`.
    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, |entry| entry.listeners.len())
    }
}
