//! Capability sets.
//!
//! A backend advertises an immutable map of feature flags. UI code asks the
//! set before offering an operation; adapters refuse operations whose flag
//! is off before attempting them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One feature flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// List, start and stop entities.
    Entities,
    /// Create additional entities.
    MultiEntity,
    /// Conversations.
    Chat,
    /// Topic subscriptions.
    Subscriptions,
    /// Configuration view.
    Config,
    /// Background scheduling.
    Cron,
    /// Tenant scoping.
    MultiTenant,
    /// Gap recovery after reconnect.
    Recovery,
}

impl Capability {
    /// Every flag, in display order.
    pub const ALL: [Self; 8] = [
        Self::Entities,
        Self::MultiEntity,
        Self::Chat,
        Self::Subscriptions,
        Self::Config,
        Self::Cron,
        Self::MultiTenant,
        Self::Recovery,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::MultiEntity => "multi_entity",
            Self::Chat => "chat",
            Self::Subscriptions => "subscriptions",
            Self::Config => "config",
            Self::Cron => "cron",
            Self::MultiTenant => "multi_tenant",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable flag map. Flags not present are `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeMap<Capability, bool>);

impl CapabilitySet {
    /// Set with exactly `enabled` switched on; every other flag off.
    #[must_use]
    pub fn with(enabled: &[Capability]) -> Self {
        Self(
            Capability::ALL
                .iter()
                .map(|c| (*c, enabled.contains(c)))
                .collect(),
        )
    }

    /// Every flag on.
    #[must_use]
    pub fn full() -> Self {
        Self::with(&Capability::ALL)
    }

    /// Every flag off.
    #[must_use]
    pub fn none() -> Self {
        Self::with(&[])
    }

    /// Whether `capability` is on.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.0.get(&capability).copied().unwrap_or(false)
    }

    /// Flags on in both sets.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self(
            Capability::ALL
                .iter()
                .map(|c| (*c, self.supports(*c) && other.supports(*c)))
                .collect(),
        )
    }

    /// Flags that are on.
    pub fn enabled(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().filter(|(_, on)| **on).map(|(c, _)| *c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_sets_only_named_flags() {
        let caps = CapabilitySet::with(&[Capability::Chat, Capability::Config]);
        assert!(caps.supports(Capability::Chat));
        assert!(!caps.supports(Capability::Cron));
        assert_eq!(caps.enabled().count(), 2);
        assert_eq!(CapabilitySet::none().enabled().count(), 0);
    }

    #[test]
    fn wire_form_is_a_flat_map() {
        let caps = CapabilitySet::with(&[Capability::MultiTenant]);
        let value = serde_json::to_value(&caps).unwrap();
        assert_eq!(value["multi_tenant"], true);
        assert_eq!(value["cron"], false);
        assert_eq!(value.as_object().unwrap().len(), Capability::ALL.len());
    }

    #[test]
    fn missing_flags_read_as_off() {
        let caps: CapabilitySet = serde_json::from_value(json!({"chat": true})).unwrap();
        assert!(caps.supports(Capability::Chat));
        assert!(!caps.supports(Capability::Entities));
    }

    #[test]
    fn intersection() {
        let a = CapabilitySet::with(&[Capability::Chat, Capability::Cron]);
        let b = CapabilitySet::with(&[Capability::Cron, Capability::Config]);
        let both = a.intersect(&b);
        assert_eq!(both.enabled().collect::<Vec<_>>(), vec![Capability::Cron]);
    }
}
