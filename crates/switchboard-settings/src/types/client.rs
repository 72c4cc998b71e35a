//! Client transport and backend selection settings.

use serde::{Deserialize, Serialize};
use switchboard_core::backoff::BackoffConfig;

/// Reconnecting client settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8787/ws`.
    pub url: String,
    /// Bearer token presented at handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Reconnect delays.
    pub backoff: BackoffConfig,
    /// Seconds between client `ping` commands (at most 45).
    pub ping_interval_secs: u64,
    /// Seconds without any inbound frame before the link is declared dead.
    pub idle_timeout_secs: u64,
    /// Overall deadline for one request/response exchange, in ms.
    pub request_timeout_ms: u64,
    /// Deadline for the `connection.established` notice after upgrade, in ms.
    pub handshake_timeout_ms: u64,
    /// Buffered events per local listener before new events are dropped.
    pub listener_capacity: usize,
    /// Event ids remembered per topic for duplicate suppression.
    pub dedup_window: usize,
    /// Run gap recovery for conversational topics after reconnect.
    pub recovery: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/ws".to_string(),
            token: None,
            backoff: BackoffConfig::default(),
            ping_interval_secs: 25,
            idle_timeout_secs: 60,
            request_timeout_ms: 10_000,
            handshake_timeout_ms: 5_000,
            listener_capacity: 256,
            dedup_window: 1024,
            recovery: true,
        }
    }
}

/// Which backend the dashboard talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Probe the remote server; fall back to local.
    #[default]
    Auto,
    /// Always the remote server.
    Remote,
    /// Always the embedded engine.
    Local,
}

/// Backend selection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Selection mode.
    pub mode: BackendMode,
    /// Reachability probe deadline in ms.
    pub probe_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            mode: BackendMode::Auto,
            probe_timeout_ms: 1_500,
        }
    }
}
