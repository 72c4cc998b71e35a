//! Metric names and the Prometheus recorder behind `/metrics`.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::info;

// Commands. Labels: `command`, plus `code` on errors.
/// Counter.
pub const COMMANDS_TOTAL: &str = "switchboard_commands_total";
/// Counter.
pub const COMMAND_ERRORS_TOTAL: &str = "switchboard_command_errors_total";
/// Histogram, seconds.
pub const COMMAND_DURATION_SECONDS: &str = "switchboard_command_duration_seconds";

// Connections.
/// Counter.
pub const WS_CONNECTIONS_TOTAL: &str = "switchboard_ws_connections_total";
/// Counter.
pub const WS_DISCONNECTIONS_TOTAL: &str = "switchboard_ws_disconnections_total";
/// Gauge.
pub const WS_CONNECTIONS_ACTIVE: &str = "switchboard_ws_connections_active";
/// Counter, label `reason` (`unauthorized`, `limit`).
pub const WS_REJECTED_TOTAL: &str = "switchboard_ws_rejected_total";
/// Histogram, seconds.
pub const WS_CONNECTION_DURATION_SECONDS: &str = "switchboard_ws_connection_duration_seconds";
/// Counter. Inbound frames that did not decode.
pub const WS_MALFORMED_TOTAL: &str = "switchboard_ws_malformed_total";
/// Counter. Connections the heartbeat sweep closed.
pub const HEARTBEAT_EVICTIONS_TOTAL: &str = "switchboard_heartbeat_evictions_total";

// Fan-out.
/// Counter.
pub const EVENTS_PUBLISHED_TOTAL: &str = "switchboard_events_published_total";
/// Counter. One per queued delivery.
pub const EVENTS_DELIVERED_TOTAL: &str = "switchboard_events_delivered_total";
/// Counter. Deliveries lost to a full outbound queue.
pub const EVENTS_DROPPED_TOTAL: &str = "switchboard_events_dropped_total";
/// Gauge.
pub const SUBSCRIPTIONS_ACTIVE: &str = "switchboard_subscriptions_active";

/// Command latency buckets, seconds.
const COMMAND_BUCKETS: &[f64] = &[0.001, 0.005, 0.025, 0.1, 0.5, 2.5, 10.0, 30.0];
/// Connection lifetime buckets, seconds.
const LIFETIME_BUCKETS: &[f64] = &[1.0, 10.0, 60.0, 600.0, 3_600.0, 21_600.0, 86_400.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(COMMAND_DURATION_SECONDS.into()), COMMAND_BUCKETS)?
        .set_buckets_for_metric(
            Matcher::Full(WS_CONNECTION_DURATION_SECONDS.into()),
            LIFETIME_BUCKETS,
        )
}

/// Install the process-wide recorder and describe every metric.
///
/// Fails when a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = builder()?.install_recorder()?;
    describe();
    info!("prometheus recorder installed");
    Ok(handle)
}

fn describe() {
    describe_counter!(COMMANDS_TOTAL, "Commands dispatched");
    describe_counter!(COMMAND_ERRORS_TOTAL, "Commands answered with an error");
    describe_histogram!(COMMAND_DURATION_SECONDS, Unit::Seconds, "Handler run time");
    describe_counter!(WS_CONNECTIONS_TOTAL, "Connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "Connections closed");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "Open connections");
    describe_counter!(WS_REJECTED_TOTAL, "Handshakes refused");
    describe_histogram!(WS_CONNECTION_DURATION_SECONDS, Unit::Seconds, "Connection lifetime");
    describe_counter!(WS_MALFORMED_TOTAL, "Undecodable inbound frames");
    describe_counter!(HEARTBEAT_EVICTIONS_TOTAL, "Idle connections evicted");
    describe_counter!(EVENTS_PUBLISHED_TOTAL, "Events published");
    describe_counter!(EVENTS_DELIVERED_TOTAL, "Events queued for delivery");
    describe_counter!(EVENTS_DROPPED_TOTAL, "Events dropped by backpressure");
    describe_gauge!(SUBSCRIPTIONS_ACTIVE, "Topic subscriptions held");
}

/// Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}
