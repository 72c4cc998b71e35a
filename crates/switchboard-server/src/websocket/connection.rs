//! Server-side state of one WebSocket client.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use switchboard_core::ids::ConnectionId;
use switchboard_core::topic::Topic;
use switchboard_core::types::Principal;
use switchboard_settings::BackpressurePolicy;
use tokio::time::Instant;

use super::queue::{CloseReason, OutboundQueue, PushOutcome};

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded but the handshake event has not been queued yet.
    Connecting,
    /// Eligible for fan-out.
    Open,
    /// Close requested; the writer is flushing the close frame.
    Closing,
    /// Gone.
    Closed,
}

/// A connected client.
pub struct ClientConnection {
    /// Server-assigned id.
    pub id: ConnectionId,
    /// Authenticated identity.
    pub principal: Principal,
    /// When the upgrade completed.
    pub connected_at: Instant,
    state: Mutex<ConnectionState>,
    subscriptions: Mutex<BTreeSet<Topic>>,
    last_seen: Mutex<Instant>,
    last_probe: Mutex<Instant>,
    queue: OutboundQueue,
}

impl ClientConnection {
    /// New connection in the `Connecting` state.
    pub fn new(
        id: ConnectionId,
        principal: Principal,
        queue_capacity: usize,
        policy: BackpressurePolicy,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            principal,
            connected_at: now,
            state: Mutex::new(ConnectionState::Connecting),
            subscriptions: Mutex::new(BTreeSet::new()),
            last_seen: Mutex::new(now),
            last_probe: Mutex::new(now),
            queue: OutboundQueue::new(queue_capacity, policy),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether fan-out should deliver to this connection.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// `Connecting -> Open`. No-op in any other state.
    pub fn mark_open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
            true
        } else {
            false
        }
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame, measured at `now`.
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }

    /// Time since the last probe (or the upgrade), measured at `now`.
    pub fn since_probe(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_probe.lock())
    }

    /// Queue a probe and remember when.
    pub fn probe(&self, now: Instant) -> bool {
        *self.last_probe.lock() = now;
        self.queue.request_probe()
    }

    /// Add a topic. Returns `false` if already present.
    pub fn subscribe(&self, topic: Topic) -> bool {
        self.subscriptions.lock().insert(topic)
    }

    /// Remove a topic. Returns `false` if absent.
    pub fn unsubscribe(&self, topic: &Topic) -> bool {
        self.subscriptions.lock().remove(topic)
    }

    /// Whether `topic` is in the subscription set.
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.subscriptions.lock().contains(topic)
    }

    /// Snapshot of the subscription set.
    pub fn subscriptions(&self) -> Vec<Topic> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    /// Enqueue an encoded event.
    pub fn send_event(&self, frame: Arc<str>) -> PushOutcome {
        self.queue.push_event(frame)
    }

    /// Enqueue an encoded response.
    pub fn send_reply(&self, frame: Arc<str>) -> PushOutcome {
        self.queue.push_reply(frame)
    }

    /// Clear subscriptions and schedule the close frame.
    ///
    /// Returns `false` if the connection was already closing.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return false;
            }
            *state = ConnectionState::Closing;
        }
        self.subscriptions.lock().clear();
        let _ = self.queue.close(reason);
        true
    }

    /// Final transition once the socket is gone.
    pub fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Closed;
        self.subscriptions.lock().clear();
    }

    /// The outbound queue drained by the writer task.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }
}
