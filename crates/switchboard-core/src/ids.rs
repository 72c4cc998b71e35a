//! Typed identifiers.
//!
//! [`Id<K>`] is a string tagged with a zero-sized kind, so a [`RequestId`]
//! cannot be passed where an [`EventId`] is expected. Fresh ids are UUID v7,
//! which sort by creation time. Ids that arrive over the wire or from
//! configuration (`"local"`, `"req-1"`) are taken verbatim.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of kind `K`.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<K> {
    value: String,
    #[serde(skip)]
    kind: PhantomData<fn() -> K>,
}

impl<K> Id<K> {
    /// Fresh time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(Uuid::now_v7().to_string())
    }

    fn wrap(value: String) -> Self {
        Self {
            value,
            kind: PhantomData,
        }
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// True only for ids built from an empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Unwrap into the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.value
    }
}

// Hand-written so `K` needs no bounds.

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::wrap(self.value.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<K> std::hash::Hash for Id<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K> Default for Id<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K> AsRef<str> for Id<K> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<K> From<String> for Id<K> {
    fn from(value: String) -> Self {
        Self::wrap(value)
    }
}

impl<K> From<&str> for Id<K> {
    fn from(value: &str) -> Self {
        Self::wrap(value.to_owned())
    }
}

/// Id kinds. Never constructed.
pub mod kind {
    /// A published event. Recovery deduplicates on it.
    pub enum Event {}
    /// A command awaiting its response.
    pub enum Request {}
    /// One server-side transport connection.
    pub enum Connection {}
    /// A managed entity.
    pub enum Entity {}
    /// A scheduled job.
    pub enum Job {}
}

/// Identity of a published event.
pub type EventId = Id<kind::Event>;
/// Correlates a command with its response.
pub type RequestId = Id<kind::Request>;
/// Server-side identity of one connection.
pub type ConnectionId = Id<kind::Connection>;
/// Identity of a managed entity.
pub type EntityId = Id<kind::Entity>;
/// Identity of a cron job.
pub type JobId = Id<kind::Job>;
