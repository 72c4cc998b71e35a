//! Command dispatch: registry, shared context and handlers.

pub mod context;
pub mod handlers;
pub mod registry;
