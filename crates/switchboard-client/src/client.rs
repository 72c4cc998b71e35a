//! Application-facing client handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use switchboard_core::subscription::{Disposer, Subscription};
use switchboard_core::topic::{Topic, TopicRegistry};
use switchboard_settings::ClientSettings;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::{ClientError, Result};
use crate::listeners::ListenerRegistry;
use crate::recovery::RecoverySource;
use crate::requester::Requester;
use crate::state::ClientState;
use crate::transport::Transport;

/// Reconnecting client for one Switchboard server.
///
/// Owns a background task holding at most one connection. Dropping the
/// client stops the task.
pub struct Client {
    requester: Requester,
    listeners: Arc<Mutex<ListenerRegistry>>,
    topics: TopicRegistry,
    state: watch::Receiver<ClientState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Start connecting with gap recovery through the server's journal.
    pub fn start(settings: ClientSettings) -> Self {
        Self::spawn(settings, None)
    }

    /// Start connecting with gap recovery through `source`.
    pub fn with_recovery_source(settings: ClientSettings, source: Arc<dyn RecoverySource>) -> Self {
        Self::spawn(settings, Some(source))
    }

    fn spawn(settings: ClientSettings, recovery: Option<Arc<dyn RecoverySource>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let listeners = Arc::new(Mutex::new(ListenerRegistry::new(
            settings.listener_capacity,
            settings.dedup_window,
        )));
        let cancel = CancellationToken::new();
        let requester = Requester::new(
            tx.clone(),
            state_rx.clone(),
            Duration::from_millis(settings.request_timeout_ms),
        );

        let transport = Transport::new(
            settings,
            (tx, rx),
            state_tx,
            listeners.clone(),
            recovery,
            cancel.clone(),
        );
        let task = tokio::spawn(transport.run());

        Self {
            requester,
            listeners,
            topics: TopicRegistry::standard(),
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// A cloneable command handle sharing this client's connection.
    pub fn requester(&self) -> Requester {
        self.requester.clone()
    }

    /// Send a correlated command and wait for its response data.
    pub async fn request(&self, command: &str, data: Value) -> Result<Value> {
        self.requester.request(command, data).await
    }

    /// [`Self::request`] with the response deserialized.
    pub async fn request_as<T: DeserializeOwned>(&self, command: &str, data: Value) -> Result<T> {
        self.requester.request_as(command, data).await
    }

    /// Send a command that is never answered.
    pub fn notify(&self, command: &str, data: Value) -> Result<()> {
        self.requester.notify(command, data)
    }

    /// Listen on `topic`.
    ///
    /// The topic is validated locally. The first listener on a topic
    /// subscribes on the server; disposing the last one unsubscribes.
    /// While disconnected this resolves immediately and the subscribe is
    /// sent on the next handshake.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let topic = self.topics.check(topic)?;
        let (id, rx, first) = self.listeners.lock().attach(&topic);

        let disposer = {
            let listeners = self.listeners.clone();
            let requester = self.requester.clone();
            let topic = topic.clone();
            Disposer::new(move || {
                if listeners.lock().detach(&topic, id) {
                    requester.unsubscribe(topic);
                }
            })
        };

        if first {
            if let Err(e) = self.requester.subscribe(topic.clone()).await {
                disposer.dispose();
                return Err(e);
            }
        }
        Ok(Subscription::new(topic, rx, disposer))
    }

    /// Topics with at least one local listener.
    pub fn active_topics(&self) -> Vec<Topic> {
        self.listeners.lock().topics()
    }

    /// Current connection state.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Receiver of state transitions, for rendering connection status.
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    /// Wait until connected, or fail if the client reaches a terminal state.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.clone();
        let reached = tokio::time::timeout(
            timeout,
            state.wait_for(|s| s.is_connected() || s.is_terminal()),
        )
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
        .map_err(|_| ClientError::Closed)?
        .clone();
        match reached {
            ClientState::Connected => Ok(()),
            ClientState::Failed { reason } => Err(ClientError::Failed(reason)),
            _ => Err(ClientError::Closed),
        }
    }

    /// Stop the connection task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
