//! WebSocket connection management, fan-out, heartbeat and message dispatch.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod journal;
pub mod queue;
pub mod session;
