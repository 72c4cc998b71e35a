//! Per-topic ring buffer of published events, served by `history`.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use switchboard_core::envelope::EventEnvelope;
use switchboard_core::topic::Topic;
use tracing::debug;

/// Default bound on tracked topics.
pub const DEFAULT_MAX_TOPICS: usize = 4096;

struct Ring {
    events: VecDeque<EventEnvelope>,
    /// Write sequence of the last append.
    written: u64,
}

#[derive(Default)]
struct Rings {
    by_topic: HashMap<Topic, Ring>,
    seq: u64,
}

/// Bounded event journal.
pub struct Journal {
    capacity: usize,
    max_topics: usize,
    topics: RwLock<Rings>,
}

impl Journal {
    /// Journal keeping the last `capacity` events of every topic.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            max_topics: DEFAULT_MAX_TOPICS,
            topics: RwLock::new(Rings::default()),
        }
    }

    /// Track at most `max_topics` topics. Clamped to at least one.
    #[must_use]
    pub fn with_max_topics(mut self, max_topics: usize) -> Self {
        self.max_topics = max_topics.max(1);
        self
    }

    /// Append an event, evicting the oldest when full.
    ///
    /// A write to a new topic when `max_topics` are tracked drops the ring
    /// that was written least recently.
    pub fn record(&self, event: &EventEnvelope) {
        if self.capacity == 0 {
            return;
        }
        let mut rings = self.topics.write();
        rings.seq += 1;
        let seq = rings.seq;
        if !rings.by_topic.contains_key(&event.topic) && rings.by_topic.len() >= self.max_topics {
            let stalest = rings
                .by_topic
                .iter()
                .min_by_key(|(_, ring)| ring.written)
                .map(|(topic, _)| topic.clone());
            if let Some(topic) = stalest {
                let _ = rings.by_topic.remove(&topic);
                debug!(topic = %topic, "journal dropped stalest topic");
            }
        }
        let ring = rings.by_topic.entry(event.topic.clone()).or_insert_with(|| Ring {
            events: VecDeque::new(),
            written: seq,
        });
        if ring.events.len() == self.capacity {
            let _ = ring.events.pop_front();
        }
        ring.events.push_back(event.clone());
        ring.written = seq;
    }

    /// Events on `topic` with `timestamp >= after`, oldest first.
    ///
    /// When more than `limit` match, the most recent `limit` are returned.
    pub fn since(
        &self,
        topic: &Topic,
        after: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Vec<EventEnvelope> {
        let rings = self.topics.read();
        let Some(ring) = rings.by_topic.get(topic) else {
            return Vec::new();
        };
        let mut events: Vec<EventEnvelope> = ring
            .events
            .iter()
            .filter(|e| after.is_none_or(|bound| e.timestamp >= bound))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            if events.len() > limit {
                let _ = events.drain(..events.len() - limit);
            }
        }
        events
    }

    /// Number of topics with at least one event.
    pub fn topic_count(&self) -> usize {
        self.topics.read().by_topic.len()
    }
}
