//! Where engine events go.
//!
//! The server plugs in its subscription manager; the local backend plugs
//! in an in-process bus. Publishing never blocks.

use switchboard_core::envelope::EventEnvelope;

/// Receives every event the engine emits.
pub trait EventSink: Send + Sync {
    /// Fan `event` out to current listeners; returns how many were reached.
    fn publish(&self, event: &EventEnvelope) -> usize;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &EventEnvelope) -> usize {
        0
    }
}
