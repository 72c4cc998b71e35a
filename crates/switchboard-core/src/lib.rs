//! # switchboard-core
//!
//! Shared vocabulary for every Switchboard crate:
//!
//! - **Envelopes**: the three wire message kinds (`event`, `command`,
//!   `response`) and the fail-closed [`envelope::decode`]
//! - **Topics**: the closed topic grammar and [`topic::TopicRegistry`]
//! - **Branded IDs**: `EventId`, `RequestId`, `ConnectionId`, ... as newtypes
//! - **Errors**: the protocol error taxonomy and its wire codes
//! - **Backoff**: exponential delay math shared by reconnecting clients
//! - **Capabilities**: the immutable feature-flag map backends advertise
//! - **Subscriptions**: the receiver + disposer handle every backend returns

#![deny(unsafe_code)]

pub mod backoff;
pub mod capabilities;
pub mod commands;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod subscription;
pub mod topic;
pub mod types;

pub use capabilities::{Capability, CapabilitySet};
pub use envelope::{CommandEnvelope, Envelope, ErrorBody, EventEnvelope, ResponseEnvelope};
pub use errors::ProtocolError;
pub use ids::{ConnectionId, EntityId, EventId, JobId, RequestId};
pub use subscription::{Disposer, Subscription};
pub use topic::{Topic, TopicKind, TopicRegistry};
