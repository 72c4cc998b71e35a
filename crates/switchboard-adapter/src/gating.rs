//! Capability-driven UI gating.
//!
//! A surface is rendered only when every flag it needs is on. Nothing is
//! offered first and refused later.

use serde::Serialize;
use switchboard_core::capabilities::{Capability, CapabilitySet};

/// Dashboard surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    /// Entity list with start/stop controls.
    Entities,
    /// The "new entity" form.
    EntityCreate,
    /// Conversation view.
    Chat,
    /// Live event feed.
    Activity,
    /// Settings view.
    Config,
    /// Scheduled jobs.
    Cron,
    /// Tenant switcher.
    Tenants,
}

impl Panel {
    /// Every panel, in navigation order.
    pub const ALL: [Self; 7] = [
        Self::Entities,
        Self::EntityCreate,
        Self::Chat,
        Self::Activity,
        Self::Config,
        Self::Cron,
        Self::Tenants,
    ];

    /// Flags this panel needs.
    #[must_use]
    pub fn requires(self) -> &'static [Capability] {
        match self {
            Self::Entities => &[Capability::Entities],
            Self::EntityCreate => &[Capability::Entities, Capability::MultiEntity],
            Self::Chat => &[Capability::Chat],
            Self::Activity => &[Capability::Subscriptions],
            Self::Config => &[Capability::Config],
            Self::Cron => &[Capability::Cron],
            Self::Tenants => &[Capability::MultiTenant],
        }
    }

    /// Whether `capabilities` allows this panel.
    #[must_use]
    pub fn is_visible(self, capabilities: &CapabilitySet) -> bool {
        self.requires().iter().all(|c| capabilities.supports(*c))
    }
}

/// Panels to render for a backend with `capabilities`.
#[must_use]
pub fn visible_panels(capabilities: &CapabilitySet) -> Vec<Panel> {
    Panel::ALL
        .into_iter()
        .filter(|p| p.is_visible(capabilities))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;

    #[test]
    fn local_hides_server_only_panels() {
        let panels = visible_panels(&BackendKind::Local.static_capabilities());
        assert_eq!(
            panels,
            vec![Panel::Entities, Panel::Chat, Panel::Activity, Panel::Config]
        );
    }

    #[test]
    fn remote_shows_everything() {
        let panels = visible_panels(&BackendKind::Remote.static_capabilities());
        assert_eq!(panels, Panel::ALL.to_vec());
    }

    #[test]
    fn create_needs_both_flags() {
        let caps = CapabilitySet::with(&[Capability::MultiEntity]);
        assert!(!Panel::EntityCreate.is_visible(&caps));
        assert!(visible_panels(&caps).is_empty());
    }

    #[test]
    fn empty_set_shows_nothing() {
        assert!(visible_panels(&CapabilitySet::default()).is_empty());
    }
}
