//! # switchboard-adapter
//!
//! One [`Backend`] interface over two variants:
//!
//! - **Remote**: commands and subscriptions through the reconnecting
//!   client; capabilities negotiated with the server once and frozen
//! - **Local**: direct calls into an in-process engine; server-only
//!   features (multi-entity, cron, tenants, recovery) reported off
//! - **Mode selection**: explicit, or `auto` with a single health probe at
//!   startup; a dead transport surfaces as a fatal status, never as a
//!   silent switch to the other variant
//! - **Gating**: [`visible_panels`] decides what a UI renders from the
//!   capability map alone

#![deny(unsafe_code)]

pub mod backend;
pub mod errors;
pub mod gating;
pub mod local;
pub mod mode;
pub mod remote;

pub use backend::{Backend, BackendKind, BackendStatus, CronOps, TenantOps};
pub use errors::{AdapterError, Result};
pub use gating::{Panel, visible_panels};
pub use local::{LocalBackend, LocalBus};
pub use mode::{ModeSelector, health_url, open_backend};
pub use remote::RemoteBackend;
