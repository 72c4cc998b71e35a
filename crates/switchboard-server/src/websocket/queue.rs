//! Bounded per-connection outbound queue.
//!
//! Producers (publish, command replies, the heartbeat monitor) never wait:
//! every push takes a short lock and returns. The connection's writer task
//! is the single consumer and drains in priority order:
//! close > probe > replies > events.
//!
//! Only the event lane is lossy. When it is full the configured
//! [`BackpressurePolicy`] decides which event is discarded, or whether the
//! connection is dropped instead.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use switchboard_settings::BackpressurePolicy;
use tokio::sync::Notify;

/// Why the server closed a connection. Sent as the close frame reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// No inbound traffic within the idle timeout.
    IdleTimeout,
    /// Closed by an operator or test.
    Evicted,
    /// Outbound queue overflow under the `disconnect` policy.
    Backpressure,
    /// The server is shutting down.
    Shutdown,
    /// The peer went away first.
    ClientClosed,
}

impl CloseReason {
    /// Close frame reason text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle timeout",
            Self::Evicted => "evicted",
            Self::Backpressure => "backpressure",
            Self::Shutdown => "server shutdown",
            Self::ClientClosed => "client closed",
        }
    }

    /// Close frame status code.
    pub fn code(self) -> u16 {
        match self {
            Self::IdleTimeout => 4000,
            Self::Evicted => 4001,
            Self::Backpressure => 4002,
            Self::Shutdown => 1001,
            Self::ClientClosed => 1000,
        }
    }
}

/// Next thing the writer should put on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded envelope.
    Frame(Arc<str>),
    /// A transport-level liveness probe.
    Probe,
    /// A close frame; nothing follows it.
    Close(CloseReason),
}

/// Result of a push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued without loss.
    Queued,
    /// Enqueued after evicting the oldest queued event.
    DroppedOldest,
    /// Discarded because the queue was full.
    DroppedNewest,
    /// Full under the `disconnect` policy; the caller must close.
    Overflow,
    /// The queue is closed.
    Closed,
}

impl PushOutcome {
    /// Whether an event was lost.
    pub fn lost_event(self) -> bool {
        matches!(self, Self::DroppedOldest | Self::DroppedNewest)
    }
}

enum Step {
    Item(Outbound),
    Finished,
    Empty,
}

#[derive(Default)]
struct State {
    events: VecDeque<Arc<str>>,
    replies: VecDeque<Arc<str>>,
    probe: bool,
    close: Option<CloseReason>,
    finished: bool,
    dropped: u64,
}

/// See module docs.
pub struct OutboundQueue {
    capacity: usize,
    policy: BackpressurePolicy,
    state: Mutex<State>,
    notify: Notify,
}

impl OutboundQueue {
    /// Queue holding at most `capacity` events (and as many replies).
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an encoded event.
    pub fn push_event(&self, frame: Arc<str>) -> PushOutcome {
        let mut state = self.state.lock();
        if state.finished || state.close.is_some() {
            return PushOutcome::Closed;
        }
        let outcome = if state.events.len() < self.capacity {
            state.events.push_back(frame);
            PushOutcome::Queued
        } else {
            match self.policy {
                BackpressurePolicy::DropOldest => {
                    let _ = state.events.pop_front();
                    state.events.push_back(frame);
                    state.dropped += 1;
                    PushOutcome::DroppedOldest
                }
                BackpressurePolicy::DropNewest => {
                    state.dropped += 1;
                    PushOutcome::DroppedNewest
                }
                BackpressurePolicy::Disconnect => PushOutcome::Overflow,
            }
        };
        drop(state);
        if matches!(outcome, PushOutcome::Queued | PushOutcome::DroppedOldest) {
            self.notify.notify_one();
        }
        outcome
    }

    /// Enqueue an encoded command response. Never dropped; a full reply
    /// lane reports [`PushOutcome::Overflow`].
    pub fn push_reply(&self, frame: Arc<str>) -> PushOutcome {
        let mut state = self.state.lock();
        if state.finished || state.close.is_some() {
            return PushOutcome::Closed;
        }
        if state.replies.len() >= self.capacity {
            return PushOutcome::Overflow;
        }
        state.replies.push_back(frame);
        drop(state);
        self.notify.notify_one();
        PushOutcome::Queued
    }

    /// Ask the writer to send a probe. Coalesces with a pending probe.
    pub fn request_probe(&self) -> bool {
        let mut state = self.state.lock();
        if state.finished || state.close.is_some() {
            return false;
        }
        state.probe = true;
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Discard everything pending and schedule a close frame.
    ///
    /// Returns `false` if the queue was already closing.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock();
        if state.finished || state.close.is_some() {
            return false;
        }
        state.events.clear();
        state.replies.clear();
        state.probe = false;
        state.close = Some(reason);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Whether a close has been requested.
    pub fn is_closed(&self) -> bool {
        let state = self.state.lock();
        state.finished || state.close.is_some()
    }

    /// Queued events not yet taken by the writer.
    pub fn pending_events(&self) -> Vec<Arc<str>> {
        self.state.lock().events.iter().cloned().collect()
    }

    /// Events lost to backpressure so far.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Take the next item without waiting.
    pub fn try_next(&self) -> Option<Outbound> {
        match self.take() {
            Step::Item(item) => Some(item),
            Step::Finished | Step::Empty => None,
        }
    }

    /// Wait for the next item; `None` after the close frame was taken.
    pub async fn next(&self) -> Option<Outbound> {
        loop {
            match self.take() {
                Step::Item(item) => return Some(item),
                Step::Finished => return None,
                Step::Empty => self.notify.notified().await,
            }
        }
    }

    fn take(&self) -> Step {
        let mut state = self.state.lock();
        if state.finished {
            return Step::Finished;
        }
        if let Some(reason) = state.close.take() {
            state.finished = true;
            return Step::Item(Outbound::Close(reason));
        }
        if state.probe {
            state.probe = false;
            return Step::Item(Outbound::Probe);
        }
        if let Some(reply) = state.replies.pop_front() {
            return Step::Item(Outbound::Frame(reply));
        }
        match state.events.pop_front() {
            Some(event) => Step::Item(Outbound::Frame(event)),
            None => Step::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn drain(queue: &OutboundQueue) -> Vec<Outbound> {
        std::iter::from_fn(|| queue.try_next()).collect()
    }

    #[test]
    fn drop_oldest_keeps_newest_events() {
        let queue = OutboundQueue::new(2, BackpressurePolicy::DropOldest);
        assert_eq!(queue.push_event(frame("a")), PushOutcome::Queued);
        assert_eq!(queue.push_event(frame("b")), PushOutcome::Queued);
        assert_eq!(queue.push_event(frame("c")), PushOutcome::DroppedOldest);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(
            drain(&queue),
            vec![Outbound::Frame(frame("b")), Outbound::Frame(frame("c"))]
        );
    }

    #[test]
    fn drop_newest_keeps_oldest_events() {
        let queue = OutboundQueue::new(2, BackpressurePolicy::DropNewest);
        let _ = queue.push_event(frame("a"));
        let _ = queue.push_event(frame("b"));
        assert_eq!(queue.push_event(frame("c")), PushOutcome::DroppedNewest);
        assert_eq!(
            drain(&queue),
            vec![Outbound::Frame(frame("a")), Outbound::Frame(frame("b"))]
        );
    }

    #[test]
    fn disconnect_policy_reports_overflow() {
        let queue = OutboundQueue::new(1, BackpressurePolicy::Disconnect);
        let _ = queue.push_event(frame("a"));
        assert_eq!(queue.push_event(frame("b")), PushOutcome::Overflow);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn replies_are_not_lost_when_events_overflow() {
        let queue = OutboundQueue::new(1, BackpressurePolicy::DropOldest);
        let _ = queue.push_event(frame("e1"));
        let _ = queue.push_event(frame("e2"));
        assert_eq!(queue.push_reply(frame("r1")), PushOutcome::Queued);
        assert_eq!(
            drain(&queue),
            vec![Outbound::Frame(frame("r1")), Outbound::Frame(frame("e2"))]
        );
    }

    #[test]
    fn probe_jumps_ahead_and_coalesces() {
        let queue = OutboundQueue::new(4, BackpressurePolicy::DropOldest);
        let _ = queue.push_event(frame("e1"));
        assert!(queue.request_probe());
        assert!(queue.request_probe());
        assert_eq!(
            drain(&queue),
            vec![Outbound::Probe, Outbound::Frame(frame("e1"))]
        );
    }

    #[test]
    fn close_discards_pending_and_finishes() {
        let queue = OutboundQueue::new(4, BackpressurePolicy::DropOldest);
        let _ = queue.push_event(frame("e1"));
        let _ = queue.push_reply(frame("r1"));
        assert!(queue.close(CloseReason::IdleTimeout));
        assert!(!queue.close(CloseReason::Evicted));
        assert!(queue.is_closed());

        assert_eq!(queue.push_event(frame("late")), PushOutcome::Closed);
        assert!(!queue.request_probe());
        assert_eq!(drain(&queue), vec![Outbound::Close(CloseReason::IdleTimeout)]);
        assert!(queue.try_next().is_none());
    }

    #[tokio::test]
    async fn next_wakes_on_push() {
        let queue = Arc::new(OutboundQueue::new(4, BackpressurePolicy::DropOldest));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = queue.push_event(frame("hello"));
        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, Some(Outbound::Frame(frame("hello"))));
    }

    #[tokio::test]
    async fn next_returns_none_after_close() {
        let queue = OutboundQueue::new(4, BackpressurePolicy::DropOldest);
        let _ = queue.close(CloseReason::Shutdown);
        assert_eq!(queue.next().await, Some(Outbound::Close(CloseReason::Shutdown)));
        assert_eq!(queue.next().await, None);
    }

    #[test]
    fn close_reason_texts() {
        assert_eq!(CloseReason::IdleTimeout.as_str(), "idle timeout");
        assert_eq!(CloseReason::Shutdown.code(), 1001);
    }
}
