//! # switchboard-server
//!
//! Axum HTTP + `WebSocket` server for the Switchboard event stream.
//!
//! - Handshake: bearer/query credential check, connection cap
//! - Subscription hub: per-connection topic sets, fan-out with bounded
//!   outbound queues and a configurable overflow policy
//! - Heartbeat monitor: liveness probes and idle eviction
//! - Command dispatch: request/response correlation over the same socket
//! - Journal: bounded per-topic history for gap recovery
//! - Lifecycle: named background loops drained on shutdown

#![deny(unsafe_code)]

pub mod auth;
pub mod commands;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{Authenticator, StaticTokenAuthenticator};
pub use config::ServerConfig;
pub use server::SwitchboardServer;
pub use websocket::heartbeat::HeartbeatMonitor;
pub use websocket::hub::SubscriptionHub;
pub use websocket::queue::CloseReason;
