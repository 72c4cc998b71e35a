//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file only needs the keys it changes.

mod client;
mod engine;
mod server;

pub use client::*;
pub use engine::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Longest client ping interval that still keeps the server's idle timer
/// comfortably fed.
pub const MAX_PING_INTERVAL_SECS: u64 = 45;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "backpressure": "dropNewest" },
///   "client": { "url": "ws://hub.internal:9000/ws" },
///   "backend": { "mode": "remote" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// Server transport.
    pub server: ServerSettings,
    /// Reconnecting client.
    pub client: ClientSettings,
    /// Backend selection.
    pub backend: BackendSettings,
    /// Embedded engine.
    pub engine: EngineSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl SwitchboardSettings {
    /// Reject inconsistent combinations that serde alone cannot catch.
    pub fn validate(&self) -> Result<()> {
        let hb = &self.server.heartbeat;
        if hb.probe_interval_secs == 0 || hb.sweep_interval_secs == 0 {
            return invalid("server.heartbeat", "intervals must be positive");
        }
        if hb.probe_interval_secs >= hb.idle_timeout_secs {
            return invalid(
                "server.heartbeat.probeIntervalSecs",
                format!(
                    "probe interval ({}s) must be shorter than idle timeout ({}s)",
                    hb.probe_interval_secs, hb.idle_timeout_secs
                ),
            );
        }
        if self.server.outbound_queue_capacity == 0 {
            return invalid("server.outboundQueueCapacity", "must be positive");
        }
        if self.server.max_connections == 0 {
            return invalid("server.maxConnections", "must be positive");
        }
        if self.server.journal_max_topics == 0 {
            return invalid("server.journalMaxTopics", "must be positive");
        }

        let client = &self.client;
        if client.backoff.base_delay_ms > client.backoff.max_delay_ms {
            return invalid("client.backoff.baseDelayMs", "exceeds maxDelayMs");
        }
        if !(0.0..=1.0).contains(&client.backoff.jitter_factor) {
            return invalid("client.backoff.jitterFactor", "must be within 0..=1");
        }
        if client.ping_interval_secs == 0 || client.ping_interval_secs > MAX_PING_INTERVAL_SECS {
            return invalid(
                "client.pingIntervalSecs",
                format!("must be within 1..={MAX_PING_INTERVAL_SECS} seconds"),
            );
        }
        if client.listener_capacity == 0 || client.dedup_window == 0 {
            return invalid("client.listenerCapacity", "buffers must be positive");
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Result<()> {
    Err(SettingsError::Inconsistent {
        field,
        reason: reason.into(),
    })
}
