//! Conversations.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use switchboard_core::envelope::now_millis;
use switchboard_core::ids::EventId;
use switchboard_core::types::{ChatItem, ChatRole};

/// Produces the entity's reply to a user message.
pub trait Responder: Send + Sync {
    /// Reply text, or `None` to stay silent.
    fn reply(&self, context: &str, text: &str) -> Option<String>;
}

/// Acknowledges every message by echoing it.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn reply(&self, _context: &str, text: &str) -> Option<String> {
        Some(format!("ack: {text}"))
    }
}

/// Bounded per-context message history.
#[derive(Debug)]
pub struct ChatStore {
    limit: usize,
    contexts: RwLock<HashMap<String, VecDeque<ChatItem>>>,
}

impl ChatStore {
    /// Store keeping at most `limit` items per context.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Append a new item and return it.
    pub fn append(&self, context: &str, role: ChatRole, text: &str) -> ChatItem {
        let item = ChatItem {
            id: EventId::new(),
            context: context.to_owned(),
            role,
            text: text.to_owned(),
            timestamp: now_millis(),
        };
        let mut contexts = self.contexts.write();
        let items = contexts.entry(context.to_owned()).or_default();
        if items.len() == self.limit {
            let _ = items.pop_front();
        }
        items.push_back(item.clone());
        item
    }

    /// Items of `context` with timestamp at or after `after`.
    pub fn history(&self, context: &str, after: Option<DateTime<Utc>>) -> Vec<ChatItem> {
        self.contexts
            .read()
            .get(context)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| after.is_none_or(|t| item.timestamp >= t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
