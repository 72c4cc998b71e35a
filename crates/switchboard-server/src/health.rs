//! `/health` body. The adapter's auto mode treats any 2xx from here as "server reachable".

use std::time::Instant;

use axum::http::StatusCode;
use serde::Serialize;

use crate::websocket::hub::SubscriptionHub;

/// Coarse server state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// Accepting connections.
    Ok,
    /// Shutdown started; new handshakes are refused.
    Draining,
}

impl Liveness {
    /// HTTP status to answer with.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::Draining => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Snapshot served at `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `ok` or `draining`.
    pub status: Liveness,
    /// Engine profile name.
    pub profile: &'static str,
    /// Seconds since the server context was built.
    pub uptime_secs: u64,
    /// Open `WebSocket` connections.
    pub connections: usize,
    /// Topic subscriptions summed over connections.
    pub subscriptions: usize,
}

impl HealthReport {
    /// Read counters off `hub`.
    pub fn snapshot(
        hub: &SubscriptionHub,
        profile: &'static str,
        started_at: Instant,
        draining: bool,
    ) -> Self {
        let open = hub.connections();
        Self {
            status: if draining {
                Liveness::Draining
            } else {
                Liveness::Ok
            },
            profile,
            uptime_secs: started_at.elapsed().as_secs(),
            connections: open.len(),
            subscriptions: open.iter().map(|c| c.subscriptions().len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use switchboard_core::types::Principal;
    use switchboard_settings::BackpressurePolicy;

    use crate::websocket::journal::Journal;

    fn hub() -> SubscriptionHub {
        SubscriptionHub::new(8, BackpressurePolicy::default(), Arc::new(Journal::new(8)))
    }

    #[test]
    fn idle_hub_reports_zeroes() {
        let report = HealthReport::snapshot(&hub(), "server", Instant::now(), false);
        assert_eq!(report.status, Liveness::Ok);
        assert_eq!(report.connections, 0);
        assert_eq!(report.subscriptions, 0);
        assert!(report.uptime_secs < 2);
    }

    #[test]
    fn counts_subscriptions_across_connections() {
        let hub = hub();
        let a = hub.register(Principal::unscoped("a"));
        let b = hub.register(Principal::unscoped("b"));
        let _ = hub.subscribe(&a.id, "entities").unwrap();
        let _ = hub.subscribe(&b.id, "entities").unwrap();
        let _ = hub.subscribe(&b.id, "chat:c1").unwrap();

        let report = HealthReport::snapshot(&hub, "server", Instant::now(), false);
        assert_eq!(report.connections, 2);
        assert_eq!(report.subscriptions, 3);
    }

    #[test]
    fn draining_maps_to_unavailable() {
        let started = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let report = HealthReport::snapshot(&hub(), "server", started, true);
        assert!(report.uptime_secs >= 59);
        assert_eq!(report.status.http_status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "draining");
        assert!(json["uptimeSecs"].is_number());
    }
}
