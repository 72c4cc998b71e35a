//! # switchboard-client
//!
//! Reconnecting transport client for a Switchboard server.
//!
//! - **State machine**: `Disconnected → Connecting → Connected → Backoff → …`
//!   with exponential backoff and jitter; the attempt counter resets only
//!   after the server's `connection.established` notice
//! - **Subscriptions**: client-authoritative topic set, re-sent after every
//!   handshake; local listeners get a [`Subscription`] with a disposer
//! - **Requests**: correlated by `request_id`; a drop while in flight
//!   resolves as [`ClientError::ConnectionLost`], never retried
//! - **Recovery**: after a reconnect, conversational topics are back-filled
//!   from a [`RecoverySource`] and deduplicated by event id
//!
//! [`Subscription`]: switchboard_core::Subscription

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod listeners;
pub mod recovery;
pub mod requester;
pub mod state;
mod transport;

pub use client::Client;
pub use errors::{ClientError, Result};
pub use recovery::{
    GapTracker, RecoveryCoordinator, RecoveryPlan, RecoveryReport, RecoverySource, ServerHistory,
};
pub use requester::Requester;
pub use state::ClientState;
