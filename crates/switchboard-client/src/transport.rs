//! The connection task: one physical connection at a time, re-established
//! with backoff, subscriptions restored on every handshake.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use switchboard_core::backoff::Backoff;
use switchboard_core::commands::{EVENT_CONNECTION_ESTABLISHED, PING, SUBSCRIBE, UNSUBSCRIBE};
use switchboard_core::envelope::{self, CommandEnvelope, Envelope, ResponseEnvelope};
use switchboard_core::ids::RequestId;
use switchboard_core::topic::Topic;
use switchboard_settings::ClientSettings;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ClientError, Result};
use crate::listeners::ListenerRegistry;
use crate::recovery::{GapTracker, RecoveryCoordinator, RecoverySource, ServerHistory};
use crate::requester::{ClientCommand, Requester};
use crate::state::ClientState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum ConnectError {
    Unauthorized,
    Cancelled,
    Other(String),
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// A sent command waiting for its response.
enum Pending {
    Caller(oneshot::Sender<Result<Value>>),
    Subscribe(Topic, Option<oneshot::Sender<Result<()>>>),
    Ping,
}

/// Write half of an established connection plus its in-flight requests.
struct Live {
    sink: SplitSink<WsStream, Message>,
    pending: HashMap<RequestId, Pending>,
}

impl Live {
    async fn send(&mut self, command: CommandEnvelope) -> std::result::Result<(), String> {
        let text = envelope::encode(&Envelope::Command(command)).map_err(|e| e.to_string())?;
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| e.to_string())
    }

    /// Register `pending` under a fresh request id, then send. A failed
    /// write leaves the entry to be abandoned with the connection.
    async fn send_request(
        &mut self,
        command: &str,
        data: Value,
        pending: Pending,
    ) -> std::result::Result<(), String> {
        let command = CommandEnvelope::request(command, data);
        if let Some(rid) = &command.request_id {
            let _ = self.pending.insert(rid.clone(), pending);
        }
        self.send(command).await
    }

    fn resolve(&mut self, response: ResponseEnvelope) {
        let Some(pending) = self.pending.remove(&response.request_id) else {
            debug!(request_id = %response.request_id, "response for unknown request");
            return;
        };
        let result = match response.error {
            Some(body) => Err(ClientError::from(body)),
            None => Ok(response.data),
        };
        match pending {
            Pending::Caller(reply) => {
                let _ = reply.send(result);
            }
            Pending::Subscribe(topic, ack) => {
                if let Err(e) = &result {
                    warn!(%topic, error = %e, "subscribe rejected");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result.map(|_| ()));
                }
            }
            Pending::Ping => {}
        }
    }

    /// Fail everything in flight. Subscribes resolve `Ok`: the topic stays
    /// in the client's set and is re-sent on the next handshake.
    fn abandon(self) {
        let count = self.pending.len();
        for (_, pending) in self.pending {
            match pending {
                Pending::Caller(reply) => {
                    let _ = reply.send(Err(ClientError::ConnectionLost));
                }
                Pending::Subscribe(_, Some(ack)) => {
                    let _ = ack.send(Ok(()));
                }
                Pending::Subscribe(_, None) | Pending::Ping => {}
            }
        }
        if count > 0 {
            debug!(count, "abandoned in-flight requests");
        }
    }
}

fn close_reason(frame: Option<CloseFrame>) -> String {
    match frame {
        Some(frame) if !frame.reason.as_str().is_empty() => frame.reason.as_str().to_owned(),
        Some(frame) => format!("closed with code {}", u16::from(frame.code)),
        None => "closed by server".to_owned(),
    }
}

/// State owned by the connection task.
pub(crate) struct Transport {
    settings: ClientSettings,
    rx: mpsc::UnboundedReceiver<ClientCommand>,
    tx: mpsc::UnboundedSender<ClientCommand>,
    state: watch::Sender<ClientState>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    recovery: Option<Arc<dyn RecoverySource>>,
    gaps: GapTracker,
    cancel: CancellationToken,
    backoff: Backoff,
    topics: BTreeSet<Topic>,
    queued: VecDeque<ClientCommand>,
    connected_once: bool,
}

impl Transport {
    pub(crate) fn new(
        settings: ClientSettings,
        channel: (
            mpsc::UnboundedSender<ClientCommand>,
            mpsc::UnboundedReceiver<ClientCommand>,
        ),
        state: watch::Sender<ClientState>,
        listeners: Arc<Mutex<ListenerRegistry>>,
        recovery: Option<Arc<dyn RecoverySource>>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = channel;
        Self {
            backoff: Backoff::new(settings.backoff.clone()),
            settings,
            rx,
            tx,
            state,
            listeners,
            recovery,
            gaps: GapTracker::new(),
            cancel,
            topics: BTreeSet::new(),
            queued: VecDeque::new(),
            connected_once: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            self.set_state(ClientState::Connecting {
                attempt: self.backoff.attempt(),
            });
            let reason = match self.connect().await {
                Ok(ws) => match self.session(ws).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Lost(reason) => reason,
                },
                Err(ConnectError::Cancelled) => break,
                Err(ConnectError::Unauthorized) => {
                    self.fail("unauthorized handshake".to_owned());
                    return;
                }
                Err(ConnectError::Other(reason)) => reason,
            };

            let delay = self.backoff.next_delay(rand::random());
            let attempt = self.backoff.attempt();
            if self.backoff.exhausted() {
                self.fail(format!("gave up after {attempt} attempts: {reason}"));
                return;
            }
            info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                %reason,
                "connection lost, backing off"
            );
            self.set_state(ClientState::Backoff {
                attempt,
                delay,
                reason,
            });
            if !self.wait_offline(delay).await {
                break;
            }
        }

        self.set_state(ClientState::Closed);
        self.drain(&ClientError::Closed);
        info!("client closed");
    }

    fn set_state(&self, state: ClientState) {
        debug!(%state, "client state");
        let _ = self.state.send_replace(state);
    }

    fn fail(&mut self, reason: String) {
        warn!(%reason, "client failed");
        self.set_state(ClientState::Failed {
            reason: reason.clone(),
        });
        self.drain(&ClientError::Failed(reason));
    }

    /// Answer every queued and not-yet-received command with `err`.
    fn drain(&mut self, err: &ClientError) {
        self.rx.close();
        let mut rest: Vec<ClientCommand> = self.queued.drain(..).collect();
        while let Ok(command) = self.rx.try_recv() {
            rest.push(command);
        }
        for command in rest {
            match command {
                ClientCommand::Request { reply, .. } => {
                    let _ = reply.send(Err(err.clone()));
                }
                ClientCommand::Subscribe { ack, .. } => {
                    let _ = ack.send(Err(err.clone()));
                }
                ClientCommand::Notify { .. } | ClientCommand::Unsubscribe { .. } => {}
            }
        }
    }

    fn requester(&self) -> Requester {
        Requester::new(
            self.tx.clone(),
            self.state.subscribe(),
            Duration::from_millis(self.settings.request_timeout_ms),
        )
    }

    // ── Offline ─────────────────────────────────────────────────────

    /// Sleep out a backoff delay while still accepting commands.
    /// `false` means the client is shutting down.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = sleep_until(deadline) => return true,
                command = self.rx.recv() => match command {
                    Some(command) => self.offline(command),
                    None => return false,
                },
            }
        }
    }

    /// Handle a command while no connection is usable.
    fn offline(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Subscribe { topic, ack } => {
                let _ = self.topics.insert(topic);
                let _ = ack.send(Ok(()));
            }
            ClientCommand::Unsubscribe { topic } => {
                let _ = self.topics.remove(&topic);
            }
            other @ (ClientCommand::Request { .. } | ClientCommand::Notify { .. }) => {
                self.queued.push_back(other);
            }
        }
    }

    // ── Connect ─────────────────────────────────────────────────────

    async fn connect(&self) -> std::result::Result<WsStream, ConnectError> {
        let mut request = self
            .settings
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::Other(e.to_string()))?;
        if let Some(token) = &self.settings.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConnectError::Other(e.to_string()))?;
            let _ = request.headers_mut().insert(AUTHORIZATION, value);
        }

        let deadline = Duration::from_millis(self.settings.handshake_timeout_ms);
        tokio::select! {
            () = self.cancel.cancelled() => Err(ConnectError::Cancelled),
            result = tokio::time::timeout(deadline, connect_async(request)) => match result {
                Err(_) => Err(ConnectError::Other("connect timed out".to_owned())),
                Ok(Err(WsError::Http(response))) if response.status() == StatusCode::UNAUTHORIZED => {
                    Err(ConnectError::Unauthorized)
                }
                Ok(Err(e)) => Err(ConnectError::Other(e.to_string())),
                Ok(Ok((ws, _))) => Ok(ws),
            },
        }
    }

    // ── Session ─────────────────────────────────────────────────────

    async fn session(&mut self, ws: WsStream) -> SessionEnd {
        let (sink, mut stream) = ws.split();
        let mut live = Live {
            sink,
            pending: HashMap::new(),
        };

        if let Err(end) = self.await_established(&mut live, &mut stream).await {
            return end;
        }

        // The established notice is the first processed inbound message.
        self.backoff.reset();
        self.set_state(ClientState::Connected);

        let end = match self.on_connected(&mut live).await {
            Ok(()) => self.pump(&mut live, &mut stream).await,
            Err(reason) => SessionEnd::Lost(reason),
        };
        live.abandon();
        if matches!(end, SessionEnd::Lost(_)) {
            // Bounds for the next recovery pass are fixed here, before any
            // event from a later connection can move the watermarks.
            self.gaps.mark(&self.listeners.lock());
        }
        end
    }

    /// Commands wait until the server's `connection.established` arrives.
    async fn await_established(
        &mut self,
        live: &mut Live,
        stream: &mut futures::stream::SplitStream<WsStream>,
    ) -> std::result::Result<(), SessionEnd> {
        let deadline = Instant::now() + Duration::from_millis(self.settings.handshake_timeout_ms);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = live.sink.send(Message::Close(None)).await;
                    return Err(SessionEnd::Cancelled);
                }
                () = sleep_until(deadline) => {
                    return Err(SessionEnd::Lost("handshake timed out".to_owned()));
                }
                command = self.rx.recv() => match command {
                    Some(command) => self.offline(command),
                    None => return Err(SessionEnd::Cancelled),
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match envelope::decode_str(text.as_str()) {
                        Ok(Envelope::Event(event)) if event.event == EVENT_CONNECTION_ESTABLISHED => {
                            info!(connection_id = %event.data["connectionId"], "handshake complete");
                            return Ok(());
                        }
                        Ok(other) => debug!(kind = other.kind(), "ignoring frame before handshake"),
                        Err(e) => warn!(error = %e, "dropping malformed envelope"),
                    },
                    Some(Ok(Message::Close(frame))) => return Err(SessionEnd::Lost(close_reason(frame))),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(SessionEnd::Lost(e.to_string())),
                    None => return Err(SessionEnd::Lost("stream ended during handshake".to_owned())),
                },
            }
        }
    }

    /// Resubscribe, start recovery, flush commands queued while offline.
    async fn on_connected(&mut self, live: &mut Live) -> std::result::Result<(), String> {
        for topic in self.topics.clone() {
            live.send_request(SUBSCRIBE, json!({ "topic": topic }), Pending::Subscribe(topic, None))
                .await?;
        }
        if !self.topics.is_empty() {
            info!(count = self.topics.len(), "resubscribed");
        }

        if self.connected_once {
            self.spawn_recovery();
        }
        self.connected_once = true;

        while let Some(command) = self.queued.pop_front() {
            self.online(live, command).await?;
        }
        Ok(())
    }

    async fn pump(
        &mut self,
        live: &mut Live,
        stream: &mut futures::stream::SplitStream<WsStream>,
    ) -> SessionEnd {
        let ping_every = Duration::from_secs(self.settings.ping_interval_secs.max(1));
        let idle_timeout = Duration::from_secs(self.settings.idle_timeout_secs.max(1));
        let mut ping = interval_at(Instant::now() + ping_every, ping_every);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = live.sink.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                command = self.rx.recv() => match command {
                    Some(command) => {
                        if let Err(reason) = self.online(live, command).await {
                            return SessionEnd::Lost(reason);
                        }
                    }
                    None => return SessionEnd::Cancelled,
                },
                frame = stream.next() => {
                    last_inbound = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => self.inbound(live, text.as_str()),
                        Some(Ok(Message::Binary(data))) => {
                            warn!(len = data.len(), "dropping binary frame");
                        }
                        Some(Ok(Message::Close(frame))) => return SessionEnd::Lost(close_reason(frame)),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                        None => return SessionEnd::Lost("connection closed".to_owned()),
                    }
                }
                _ = ping.tick() => {
                    if last_inbound.elapsed() >= idle_timeout {
                        return SessionEnd::Lost("no inbound traffic".to_owned());
                    }
                    if let Err(reason) = live.send_request(PING, json!({}), Pending::Ping).await {
                        return SessionEnd::Lost(reason);
                    }
                }
            }
        }
    }

    /// Handle a command while connected.
    async fn online(&mut self, live: &mut Live, command: ClientCommand) -> std::result::Result<(), String> {
        match command {
            ClientCommand::Request {
                command,
                data,
                reply,
            } => {
                if reply.is_closed() {
                    return Ok(());
                }
                live.send_request(&command, data, Pending::Caller(reply)).await
            }
            ClientCommand::Notify { command, data } => {
                live.send(CommandEnvelope::notify(command, data)).await
            }
            ClientCommand::Subscribe { topic, ack } => {
                if self.topics.insert(topic.clone()) {
                    let data = json!({ "topic": topic });
                    live.send_request(SUBSCRIBE, data, Pending::Subscribe(topic, Some(ack)))
                        .await
                } else {
                    let _ = ack.send(Ok(()));
                    Ok(())
                }
            }
            ClientCommand::Unsubscribe { topic } => {
                if self.topics.remove(&topic) {
                    live.send(CommandEnvelope::notify(UNSUBSCRIBE, json!({ "topic": topic })))
                        .await
                } else {
                    Ok(())
                }
            }
        }
    }

    fn inbound(&self, live: &mut Live, text: &str) {
        match envelope::decode_str(text) {
            Ok(Envelope::Event(event)) => {
                let _ = self.listeners.lock().deliver(&event);
            }
            Ok(Envelope::Response(response)) => live.resolve(response),
            Ok(Envelope::Command(command)) => {
                debug!(command = %command.command, "ignoring command from server");
            }
            Err(e) => warn!(error = %e, len = text.len(), "dropping malformed envelope"),
        }
    }

    fn spawn_recovery(&self) {
        if !self.settings.recovery {
            return;
        }
        let source: Arc<dyn RecoverySource> = match &self.recovery {
            Some(source) => source.clone(),
            None => Arc::new(ServerHistory::new(self.requester())),
        };
        let plan = self.gaps.pending();
        if plan.is_empty() {
            return;
        }
        let coordinator = RecoveryCoordinator::new(source, self.listeners.clone());
        let gaps = self.gaps.clone();
        let cancel = self.cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                report = coordinator.recover(plan.clone()) => gaps.settle(&plan, &report),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Utf8Bytes;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn close_reason_prefers_text() {
        let frame = CloseFrame {
            code: CloseCode::from(4000),
            reason: Utf8Bytes::from_static("idle timeout"),
        };
        assert_eq!(close_reason(Some(frame)), "idle timeout");

        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: Utf8Bytes::from_static(""),
        };
        assert_eq!(close_reason(Some(frame)), "closed with code 1001");
        assert_eq!(close_reason(None), "closed by server");
    }

    #[test]
    fn offline_commands_are_queued_and_subscribes_acked() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ClientState::Disconnected);
        let mut transport = Transport::new(
            ClientSettings::default(),
            (tx, rx),
            state,
            Arc::new(Mutex::new(ListenerRegistry::new(4, 4))),
            None,
            CancellationToken::new(),
        );

        let (ack, mut ack_rx) = oneshot::channel();
        transport.offline(ClientCommand::Subscribe {
            topic: Topic::chat("a"),
            ack,
        });
        assert_eq!(ack_rx.try_recv().unwrap(), Ok(()));
        assert!(transport.topics.contains(&Topic::chat("a")));

        let (reply, mut reply_rx) = oneshot::channel();
        transport.offline(ClientCommand::Request {
            command: "entities.list".into(),
            data: json!({}),
            reply,
        });
        assert_eq!(transport.queued.len(), 1);

        transport.offline(ClientCommand::Unsubscribe {
            topic: Topic::chat("a"),
        });
        assert!(transport.topics.is_empty());

        transport.drain(&ClientError::Closed);
        assert_eq!(reply_rx.try_recv().unwrap(), Err(ClientError::Closed));
    }
}
