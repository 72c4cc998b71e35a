//! # switchboard-engine
//!
//! The embedded compute module. One [`Engine`] backs the server's domain
//! command handlers; another, in the `local` profile, is called directly by
//! the in-process backend.
//!
//! - **Directory**: entity registration and start/stop lifecycle
//! - **Conversations**: bounded per-context history plus a pluggable [`Responder`]
//! - **Cron**: interval jobs that post prompts into entity conversations
//! - **Sink**: the [`EventSink`] seam every state change is announced through

#![deny(unsafe_code)]

pub mod chat;
pub mod cron;
pub mod directory;
pub mod engine;
pub mod errors;
pub mod sink;

pub use chat::{EchoResponder, Responder};
pub use cron::{CronScheduler, MAX_EVERY_SECS};
pub use engine::{ChatExchange, Engine, EngineProfile, LOCAL_ENTITY_ID};
pub use errors::{EngineError, Result};
pub use sink::{EventSink, NullSink};
