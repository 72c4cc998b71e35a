//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_settings::{BackpressurePolicy, ServerSettings};

/// Runtime configuration for [`crate::server::SwitchboardServer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound event queue capacity per connection.
    pub queue_capacity: usize,
    /// Overflow behavior of the outbound queue.
    pub backpressure: BackpressurePolicy,
    /// Events retained per topic for `history`.
    pub journal_capacity: usize,
    /// Topics the journal tracks at once.
    pub journal_max_topics: usize,
    /// Seconds between liveness probes.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Seconds between heartbeat sweeps.
    pub sweep_interval_secs: u64,
    /// Seconds between cron scheduler ticks.
    pub cron_tick_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ServerSettings::default();
        Self {
            port: 0,
            ..Self::from_settings(&settings)
        }
    }
}

impl ServerConfig {
    /// Build from the server section of the settings file.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            max_message_size: settings.max_message_bytes,
            queue_capacity: settings.outbound_queue_capacity,
            backpressure: settings.backpressure,
            journal_capacity: settings.journal_capacity,
            journal_max_topics: settings.journal_max_topics,
            heartbeat_interval_secs: settings.heartbeat.probe_interval_secs,
            heartbeat_timeout_secs: settings.heartbeat.idle_timeout_secs,
            sweep_interval_secs: settings.heartbeat.sweep_interval_secs,
            cron_tick_secs: 1,
        }
    }

    /// Probe interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Sweep period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_ephemeral_localhost() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_heartbeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn from_settings_copies_values() {
        let settings = ServerSettings {
            port: 9000,
            outbound_queue_capacity: 8,
            backpressure: BackpressurePolicy::Disconnect,
            journal_max_topics: 3,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.journal_max_topics, 3);
        assert_eq!(cfg.queue_capacity, 8);
        assert_eq!(cfg.backpressure, BackpressurePolicy::Disconnect);
    }
}
