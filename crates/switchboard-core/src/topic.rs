//! Topic grammar and registry.
//!
//! A topic is either one of a fixed set of global names (`system`,
//! `entities`, ...) or a scoped name `<prefix>:<instance>` where the prefix
//! comes from a closed set and the instance id is opaque to routing.
//! Anything outside the grammar is rejected at subscribe time so a typo
//! never becomes a silently-dead subscription.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Global topic carrying server-level notices (handshake, shutdown).
pub const SYSTEM: &str = "system";
/// Global topic for entity directory changes.
pub const ENTITIES: &str = "entities";
/// Global topic for cron firings.
pub const CRON: &str = "cron";
/// Global topic for tenant changes.
pub const TENANTS: &str = "tenants";

/// Prefix of conversational contexts.
pub const CHAT_PREFIX: &str = "chat";
/// Prefix of per-entity topics.
pub const ENTITY_PREFIX: &str = "entity";
/// Prefix of per-tenant topics.
pub const TENANT_PREFIX: &str = "tenant";

/// Longest accepted instance id.
pub const MAX_INSTANCE_LEN: usize = 128;

/// Rejection reasons for a topic string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Empty string.
    #[error("topic is empty")]
    Empty,
    /// Neither a known global name nor a known prefix.
    #[error("unknown topic: {0}")]
    Unknown(String),
    /// Known prefix but the instance id violates the grammar.
    #[error("invalid instance id in topic: {0}")]
    InvalidInstance(String),
}

/// A topic string.
///
/// Constructed from code via the typed constructors, or from untrusted
/// input via [`TopicRegistry::check`] / [`Topic::parse`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

/// Structural view of a [`Topic`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicKind<'a> {
    /// A global topic name.
    Global(&'a str),
    /// A scoped topic.
    Scoped {
        /// Prefix before the colon.
        prefix: &'a str,
        /// Opaque instance id after the colon.
        instance: &'a str,
    },
}

impl Topic {
    /// The `system` topic.
    #[must_use]
    pub fn system() -> Self {
        Self(SYSTEM.to_owned())
    }

    /// The `entities` topic.
    #[must_use]
    pub fn entities() -> Self {
        Self(ENTITIES.to_owned())
    }

    /// The `cron` topic.
    #[must_use]
    pub fn cron() -> Self {
        Self(CRON.to_owned())
    }

    /// The `tenants` topic.
    #[must_use]
    pub fn tenants() -> Self {
        Self(TENANTS.to_owned())
    }

    /// Conversational context topic `chat:<context>`.
    #[must_use]
    pub fn chat(context: &str) -> Self {
        Self(format!("{CHAT_PREFIX}:{context}"))
    }

    /// Per-entity topic `entity:<id>`.
    #[must_use]
    pub fn entity(id: &str) -> Self {
        Self(format!("{ENTITY_PREFIX}:{id}"))
    }

    /// Per-tenant topic `tenant:<id>`.
    #[must_use]
    pub fn tenant(id: &str) -> Self {
        Self(format!("{TENANT_PREFIX}:{id}"))
    }

    /// Parse against the standard grammar.
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        TopicRegistry::standard().check(raw)
    }

    /// Raw topic string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into global name or prefix + instance.
    #[must_use]
    pub fn kind(&self) -> TopicKind<'_> {
        match self.0.split_once(':') {
            Some((prefix, instance)) => TopicKind::Scoped { prefix, instance },
            None => TopicKind::Global(&self.0),
        }
    }

    /// Whether this topic is a conversational context (`chat:*`).
    #[must_use]
    pub fn is_conversational(&self) -> bool {
        matches!(self.kind(), TopicKind::Scoped { prefix: CHAT_PREFIX, .. })
    }

    /// The conversation id when this is a `chat:*` topic.
    #[must_use]
    pub fn conversation(&self) -> Option<&str> {
        match self.kind() {
            TopicKind::Scoped {
                prefix: CHAT_PREFIX,
                instance,
            } => Some(instance),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The closed set of valid topic names.
#[derive(Clone, Debug)]
pub struct TopicRegistry {
    globals: BTreeSet<String>,
    prefixes: BTreeSet<String>,
}

impl TopicRegistry {
    /// Registry with the standard globals and prefixes.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            globals: [SYSTEM, ENTITIES, CRON, TENANTS]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            prefixes: [CHAT_PREFIX, ENTITY_PREFIX, TENANT_PREFIX]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Add a global topic name.
    #[must_use]
    pub fn with_global(mut self, name: &str) -> Self {
        let _ = self.globals.insert(name.to_owned());
        self
    }

    /// Add a scoped prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let _ = self.prefixes.insert(prefix.to_owned());
        self
    }

    /// Whether `raw` belongs to the grammar.
    #[must_use]
    pub fn validate(&self, raw: &str) -> bool {
        self.check(raw).is_ok()
    }

    /// Validate `raw` and return it as a [`Topic`].
    pub fn check(&self, raw: &str) -> Result<Topic, TopicError> {
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }
        match raw.split_once(':') {
            None if self.globals.contains(raw) => Ok(Topic(raw.to_owned())),
            None => Err(TopicError::Unknown(raw.to_owned())),
            Some((prefix, instance)) => {
                if !self.prefixes.contains(prefix) {
                    return Err(TopicError::Unknown(raw.to_owned()));
                }
                if is_valid_instance(instance) {
                    Ok(Topic(raw.to_owned()))
                } else {
                    Err(TopicError::InvalidInstance(raw.to_owned()))
                }
            }
        }
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn is_valid_instance(instance: &str) -> bool {
    !instance.is_empty()
        && instance.len() <= MAX_INSTANCE_LEN
        && instance
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
