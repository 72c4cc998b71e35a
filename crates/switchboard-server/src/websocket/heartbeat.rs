//! Liveness monitoring for all connections.
//!
//! One periodic sweep covers every connection. A connection silent for
//! longer than the idle timeout is closed with reason `idle timeout` and
//! removed from fan-out; otherwise it gets a probe once per probe interval.
//! Any inbound frame (including the probe's answer) counts as liveness.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::hub::SubscriptionHub;
use super::queue::CloseReason;
use crate::metrics::HEARTBEAT_EVICTIONS_TOTAL;

/// What one sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a probe.
    pub probed: usize,
    /// Connections closed for silence.
    pub evicted: usize,
}

/// Periodic liveness sweeper.
pub struct HeartbeatMonitor {
    hub: Arc<SubscriptionHub>,
    probe_interval: Duration,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl HeartbeatMonitor {
    /// Monitor over `hub`.
    pub fn new(
        hub: Arc<SubscriptionHub>,
        probe_interval: Duration,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            hub,
            probe_interval,
            idle_timeout,
            sweep_interval,
        }
    }

    /// Check every connection against `now`.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        for conn in self.hub.connections() {
            let silent = conn.silent_for(now);
            if silent > self.idle_timeout {
                if self.hub.close(&conn.id, CloseReason::IdleTimeout) {
                    info!(conn_id = %conn.id, silent_secs = silent.as_secs(), "idle connection evicted");
                    counter!(HEARTBEAT_EVICTIONS_TOTAL).increment(1);
                    report.evicted += 1;
                }
            } else if conn.since_probe(now) >= self.probe_interval && conn.probe(now) {
                report.probed += 1;
            }
        }
        if report.probed > 0 || report.evicted > 0 {
            debug!(probed = report.probed, evicted = report.evicted, "heartbeat sweep");
        }
        report
    }

    /// Sweep until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.sweep(Instant::now());
                }
                () = cancel.cancelled() => {
                    debug!("heartbeat monitor stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::journal::Journal;
    use crate::websocket::queue::Outbound;
    use serde_json::json;
    use switchboard_core::envelope::EventEnvelope;
    use switchboard_core::topic::Topic;
    use switchboard_core::types::Principal;
    use switchboard_settings::BackpressurePolicy;

    fn setup() -> (Arc<SubscriptionHub>, HeartbeatMonitor) {
        let hub = Arc::new(SubscriptionHub::new(
            16,
            BackpressurePolicy::DropOldest,
            Arc::new(Journal::new(16)),
        ));
        let monitor = HeartbeatMonitor::new(
            hub.clone(),
            Duration::from_secs(30),
            Duration::from_secs(90),
            Duration::from_secs(5),
        );
        (hub, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_is_evicted_after_timeout() {
        let (hub, monitor) = setup();
        let conn = hub.register(Principal::unscoped("tester"));
        hub.open(&conn.id).unwrap();
        let _ = hub.subscribe(&conn.id, "chat:session-42").unwrap();
        let _ = hub.subscribe(&conn.id, "entities").unwrap();

        time::advance(Duration::from_secs(91)).await;
        let report = monitor.sweep(Instant::now());
        assert_eq!(report.evicted, 1);

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.subscriber_count(&Topic::chat("session-42")), 0);
        assert_eq!(hub.subscriber_count(&Topic::entities()), 0);
        let published = hub.publish(&EventEnvelope::new(Topic::entities(), "x", json!({})));
        assert_eq!(published.delivered, 0);
        assert_eq!(
            conn.queue().try_next(),
            Some(Outbound::Close(CloseReason::IdleTimeout))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_at_timeout_is_not_evicted() {
        let (hub, monitor) = setup();
        let conn = hub.register(Principal::unscoped("tester"));
        hub.open(&conn.id).unwrap();
        time::advance(Duration::from_secs(90)).await;
        assert_eq!(monitor.sweep(Instant::now()).evicted, 0);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_keeps_connection_alive() {
        let (hub, monitor) = setup();
        let conn = hub.register(Principal::unscoped("tester"));
        hub.open(&conn.id).unwrap();
        for _ in 0..6 {
            time::advance(Duration::from_secs(30)).await;
            conn.touch();
            assert_eq!(monitor.sweep(Instant::now()).evicted, 0);
        }
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_once_per_interval() {
        let (hub, monitor) = setup();
        let conn = hub.register(Principal::unscoped("tester"));
        hub.open(&conn.id).unwrap();

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(monitor.sweep(Instant::now()).probed, 0);

        time::advance(Duration::from_secs(20)).await;
        assert_eq!(monitor.sweep(Instant::now()).probed, 1);
        assert_eq!(conn.queue().try_next(), Some(Outbound::Probe));

        time::advance(Duration::from_secs(5)).await;
        assert_eq!(monitor.sweep(Instant::now()).probed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_evicts_and_stops_on_cancel() {
        let (hub, monitor) = setup();
        let conn = hub.register(Principal::unscoped("tester"));
        hub.open(&conn.id).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        time::sleep(Duration::from_secs(96)).await;
        assert_eq!(hub.connection_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
