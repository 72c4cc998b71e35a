//! Cloneable command handle into the connection task.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use switchboard_core::topic::Topic;
use tokio::sync::{mpsc, oneshot, watch};

use crate::errors::{ClientError, Result};
use crate::state::ClientState;

/// Work handed to the connection task.
#[derive(Debug)]
pub(crate) enum ClientCommand {
    /// Correlated command; the reply carries the response data.
    Request {
        command: String,
        data: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    /// Fire-and-forget command (no `request_id`).
    Notify { command: String, data: Value },
    /// First local listener attached to `topic`.
    Subscribe {
        topic: Topic,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Last local listener detached from `topic`.
    Unsubscribe { topic: Topic },
}

/// Sends commands through the client's single connection.
///
/// Commands issued while disconnected wait for the next handshake.
#[derive(Clone, Debug)]
pub struct Requester {
    tx: mpsc::UnboundedSender<ClientCommand>,
    state: watch::Receiver<ClientState>,
    timeout: Duration,
}

impl Requester {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<ClientCommand>,
        state: watch::Receiver<ClientState>,
        timeout: Duration,
    ) -> Self {
        Self { tx, state, timeout }
    }

    /// Send a correlated command and wait for its response data.
    ///
    /// [`ClientError::ConnectionLost`] means the command was sent but the
    /// connection dropped before the answer; it is not retried.
    pub async fn request(&self, command: &str, data: Value) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Request {
            command: command.to_owned(),
            data,
            reply,
        })?;
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }

    /// [`Self::request`] with the response data deserialized.
    pub async fn request_as<T: DeserializeOwned>(&self, command: &str, data: Value) -> Result<T> {
        let value = self.request(command, data).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Payload(e.to_string()))
    }

    /// Send a command that is never answered.
    pub fn notify(&self, command: &str, data: Value) -> Result<()> {
        self.send(ClientCommand::Notify {
            command: command.to_owned(),
            data,
        })
    }

    pub(crate) async fn subscribe(&self, topic: Topic) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(ClientCommand::Subscribe { topic, ack })?;
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }

    pub(crate) fn unsubscribe(&self, topic: Topic) {
        let _ = self.send(ClientCommand::Unsubscribe { topic });
    }

    /// Current connection state.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    fn send(&self, command: ClientCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> ClientError {
        match &*self.state.borrow() {
            ClientState::Failed { reason } => ClientError::Failed(reason.clone()),
            _ => ClientError::Closed,
        }
    }
}
