//! Subscription handle shared by every backend.
//!
//! A [`Subscription`] is a receiver of events on one topic plus a
//! [`Disposer`] that detaches the listener. Dropping the handle disposes
//! it; [`Subscription::cancel`] does the same explicitly.

use std::fmt;

use tokio::sync::mpsc;

use crate::envelope::EventEnvelope;
use crate::topic::Topic;

/// Runs a detach action exactly once, on [`Disposer::dispose`] or drop.
pub struct Disposer {
    action: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Disposer {
    /// Wrap a detach action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A disposer that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self { action: None }
    }

    /// Run the action now.
    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("armed", &self.action.is_some())
            .finish()
    }
}

/// Live listener on one topic.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: mpsc::Receiver<EventEnvelope>,
    disposer: Disposer,
}

impl Subscription {
    /// Assemble from a receiver and its detach action.
    #[must_use]
    pub fn new(topic: Topic, rx: mpsc::Receiver<EventEnvelope>, disposer: Disposer) -> Self {
        Self {
            topic,
            rx,
            disposer,
        }
    }

    /// Topic this listener is attached to.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next event; `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Detach now.
    pub fn cancel(self) {
        self.disposer.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_disposer(count: &Arc<AtomicUsize>) -> Disposer {
        let count = Arc::clone(count);
        Disposer::new(move || {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn disposer_runs_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(counting_disposer(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_dispose_does_not_run_again_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        counting_disposer(&count).dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscription_delivers_and_cancels() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(Topic::system(), rx, counting_disposer(&count));

        let event = EventEnvelope::new(Topic::system(), "tick", json!({}));
        tx.send(event.clone()).await.unwrap();
        assert_eq!(sub.recv().await, Some(event));
        assert!(sub.try_recv().is_none());

        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
