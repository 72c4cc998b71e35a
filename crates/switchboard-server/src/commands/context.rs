//! Dependencies shared by every command handler.

use std::sync::Arc;
use std::time::Instant;

use switchboard_core::capabilities::{Capability, CapabilitySet};
use switchboard_core::ids::ConnectionId;
use switchboard_core::types::Principal;
use switchboard_engine::{CronScheduler, Engine, EngineProfile};

use crate::websocket::hub::SubscriptionHub;

/// Shared context passed to every command handler.
pub struct ServerContext {
    /// Connection registry and fan-out.
    pub hub: Arc<SubscriptionHub>,
    /// The compute module behind the server.
    pub engine: Arc<Engine>,
    /// Scheduler (`None` disables the `cron.*` commands).
    pub cron: Option<Arc<CronScheduler>>,
    /// What this server offers; answered by `capabilities.get`.
    pub capabilities: CapabilitySet,
    /// When the server started (for uptime calculation).
    pub started_at: Instant,
}

impl ServerContext {
    /// Context whose capability set is derived from the engine profile.
    pub fn new(
        hub: Arc<SubscriptionHub>,
        engine: Arc<Engine>,
        cron: Option<Arc<CronScheduler>>,
    ) -> Self {
        let capabilities = server_capabilities(engine.profile(), cron.is_some());
        Self {
            hub,
            engine,
            cron,
            capabilities,
            started_at: Instant::now(),
        }
    }
}

/// Capabilities a server with this engine profile can honor.
pub fn server_capabilities(profile: &EngineProfile, cron: bool) -> CapabilitySet {
    let mut enabled = vec![
        Capability::Entities,
        Capability::Chat,
        Capability::Subscriptions,
        Capability::Config,
        Capability::Recovery,
    ];
    if profile.multi_entity {
        enabled.push(Capability::MultiEntity);
    }
    if profile.multi_tenant {
        enabled.push(Capability::MultiTenant);
    }
    if cron {
        enabled.push(Capability::Cron);
    }
    CapabilitySet::with(&enabled)
}

/// The connection a command arrived on.
#[derive(Clone, Debug)]
pub struct Caller {
    /// Connection id.
    pub connection: ConnectionId,
    /// Authenticated identity.
    pub principal: Principal,
}

impl Caller {
    /// Tenant scope of the caller.
    pub fn tenant(&self) -> Option<&str> {
        self.principal.tenant.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_settings::{EngineSettings, TenantSeed};

    #[test]
    fn single_tenant_server_capabilities() {
        let profile = EngineProfile::server(&EngineSettings::default());
        let caps = server_capabilities(&profile, true);
        assert!(caps.supports(Capability::MultiEntity));
        assert!(caps.supports(Capability::Cron));
        assert!(caps.supports(Capability::Recovery));
        assert!(!caps.supports(Capability::MultiTenant));
    }

    #[test]
    fn multi_tenant_server_capabilities() {
        let settings = EngineSettings {
            tenants: vec![TenantSeed {
                id: "acme".into(),
                name: "Acme".into(),
            }],
            ..EngineSettings::default()
        };
        let caps = server_capabilities(&EngineProfile::server(&settings), false);
        assert!(caps.supports(Capability::MultiTenant));
        assert!(!caps.supports(Capability::Cron));
    }
}
