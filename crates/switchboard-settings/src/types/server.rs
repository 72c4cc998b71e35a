//! Server transport, heartbeat, journal, and handshake settings.

use serde::{Deserialize, Serialize};

/// What happens when a connection's outbound event queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackpressurePolicy {
    /// Evict the oldest queued event to make room.
    #[default]
    DropOldest,
    /// Discard the incoming event.
    DropNewest,
    /// Close the connection with reason `backpressure`.
    Disconnect,
}

/// Server network and fan-out settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 = ephemeral).
    pub port: u16,
    /// Upgrades beyond this many open connections are refused.
    pub max_connections: usize,
    /// Largest accepted inbound frame in bytes.
    pub max_message_bytes: usize,
    /// Per-connection outbound event queue capacity.
    pub outbound_queue_capacity: usize,
    /// Overflow behavior of the outbound queue.
    pub backpressure: BackpressurePolicy,
    /// Events retained per topic for `history` queries.
    pub journal_capacity: usize,
    /// Topics the journal tracks at once; the least recently written is dropped first.
    pub journal_max_topics: usize,
    /// Liveness probing.
    pub heartbeat: HeartbeatSettings,
    /// Handshake credentials.
    pub auth: AuthSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            max_connections: 64,
            max_message_bytes: 1024 * 1024,
            outbound_queue_capacity: 256,
            backpressure: BackpressurePolicy::default(),
            journal_capacity: 512,
            journal_max_topics: 4096,
            heartbeat: HeartbeatSettings::default(),
            auth: AuthSettings::default(),
        }
    }
}

/// Heartbeat timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Seconds between liveness probes sent to each connection.
    pub probe_interval_secs: u64,
    /// Seconds of inbound silence before a connection is closed.
    pub idle_timeout_secs: u64,
    /// Seconds between monitor sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            idle_timeout_secs: 90,
            sweep_interval_secs: 5,
        }
    }
}

/// One accepted handshake credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Bearer token value.
    pub token: String,
    /// Principal name bound to connections presenting this token.
    pub subject: String,
    /// Tenant scope for multi-tenant deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

/// Handshake authentication.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Accepted tokens.
    pub tokens: Vec<TokenGrant>,
    /// Accept connections without a credential (development only).
    pub allow_anonymous: bool,
}
