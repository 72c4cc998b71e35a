//! Reconnect, resubscribe and recovery against a real server.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

use switchboard_client::{Client, ClientError, ClientState, RecoverySource};
use switchboard_core::backoff::BackoffConfig;
use switchboard_core::envelope::{self, Envelope, EventEnvelope};
use switchboard_core::topic::Topic;
use switchboard_core::types::Principal;
use switchboard_server::{CloseReason, ServerConfig, StaticTokenAuthenticator, SwitchboardServer};
use switchboard_settings::{ClientSettings, EngineSettings};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn boot_with(auth: StaticTokenAuthenticator) -> (String, SwitchboardServer) {
    let server = SwitchboardServer::new(ServerConfig::default(), &EngineSettings::default(), auth);
    let addr = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn boot_server() -> (String, SwitchboardServer) {
    boot_with(StaticTokenAuthenticator::open()).await
}

fn settings(url: &str) -> ClientSettings {
    ClientSettings {
        url: url.to_owned(),
        backoff: BackoffConfig {
            base_delay_ms: 20,
            max_delay_ms: 100,
            jitter_factor: 0.0,
            max_attempts: None,
        },
        request_timeout_ms: 2_000,
        ..ClientSettings::default()
    }
}

fn message(topic: &Topic, n: u64) -> EventEnvelope {
    EventEnvelope::new(topic.clone(), "message.created", json!({ "n": n }))
}

/// Drop the client's only server-side connection.
fn force_disconnect(server: &SwitchboardServer) -> String {
    let ids = server.hub().connection_ids();
    assert_eq!(ids.len(), 1);
    assert!(server.hub().close(&ids[0], CloseReason::Evicted));
    ids[0].to_string()
}

/// Wait for a connection other than `old` to hold exactly `topics`.
async fn wait_resubscribed(server: &SwitchboardServer, old: &str, topics: &BTreeSet<Topic>) {
    timeout(TIMEOUT, async {
        loop {
            let ids = server.hub().connection_ids();
            if let Some(id) = ids.iter().find(|id| id.as_str() != old) {
                let subs: BTreeSet<Topic> = server
                    .hub()
                    .subscriptions_of(id)
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                if &subs == topics {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client never resubscribed");
}

/// Store returning every recorded event at or after the bound.
#[derive(Default)]
struct StubStore {
    events: Mutex<Vec<EventEnvelope>>,
    queries: Mutex<Vec<Topic>>,
}

#[async_trait]
impl RecoverySource for StubStore {
    async fn events_after(
        &self,
        topic: &Topic,
        after: DateTime<Utc>,
    ) -> switchboard_client::Result<Vec<EventEnvelope>> {
        self.queries.lock().push(topic.clone());
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| &e.topic == topic && e.timestamp >= after)
            .cloned()
            .collect())
    }
}

/// Store that answers only once the test opens it.
#[derive(Default)]
struct GatedStore {
    inner: StubStore,
    open: tokio::sync::Notify,
}

#[async_trait]
impl RecoverySource for GatedStore {
    async fn events_after(
        &self,
        topic: &Topic,
        after: DateTime<Utc>,
    ) -> switchboard_client::Result<Vec<EventEnvelope>> {
        self.open.notified().await;
        self.inner.events_after(topic, after).await
    }
}

// ── Requests ──

#[tokio::test]
async fn request_round_trip() {
    let (url, _server) = boot_server().await;
    let client = Client::start(settings(&url));
    client.wait_connected(TIMEOUT).await.unwrap();

    let value = client.request("entities.list", json!({})).await.unwrap();
    assert_eq!(value["entities"].as_array().unwrap().len(), 1);

    let err = client.request("teleport", json!({})).await.unwrap_err();
    assert_eq!(err.code(), "METHOD_NOT_FOUND");
    client.shutdown().await;
}

#[tokio::test]
async fn commands_issued_before_handshake_are_delivered_after_it() {
    let (url, _server) = boot_server().await;
    let client = Client::start(settings(&url));
    // No wait: the request is queued until the handshake completes.
    let value = client.request("config.get", json!({})).await.unwrap();
    assert_eq!(value["profile"]["name"], "server");
    client.shutdown().await;
}

#[tokio::test]
async fn unauthorized_handshake_fails_terminally() {
    let auth = StaticTokenAuthenticator::default().with_token("s3cret", Principal::unscoped("ops"));
    let (url, _server) = boot_with(auth).await;

    let client = Client::start(settings(&url));
    let err = client.wait_connected(TIMEOUT).await.unwrap_err();
    assert_matches!(err, ClientError::Failed(_));
    assert_matches!(client.state(), ClientState::Failed { .. });

    let authed = Client::start(ClientSettings {
        token: Some("s3cret".into()),
        ..settings(&url)
    });
    authed.wait_connected(TIMEOUT).await.unwrap();
    authed.shutdown().await;
}

#[tokio::test]
async fn in_flight_request_resolves_as_connection_lost() {
    // A server that completes the handshake, reads one command and hangs up.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let established = Envelope::Event(EventEnvelope::new(
            Topic::system(),
            "connection.established",
            json!({ "connectionId": "conn_fake" }),
        ));
        ws.send(Message::text(envelope::encode(&established).unwrap()))
            .await
            .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(&msg, Message::Text(text) if text.as_str().contains("entities.list")) {
                break;
            }
        }
    });

    let client = Client::start(settings(&format!("ws://{addr}/ws")));
    let err = client.request("entities.list", json!({})).await.unwrap_err();
    assert_eq!(err, ClientError::ConnectionLost);
    client.shutdown().await;
}

// ── Reconnect ──

#[tokio::test]
async fn reconnect_restores_exactly_the_previous_topics() {
    let (url, server) = boot_server().await;
    let client = Client::start(settings(&url));
    client.wait_connected(TIMEOUT).await.unwrap();

    let _a = client.subscribe("chat:a").await.unwrap();
    let _b = client.subscribe("entities").await.unwrap();
    let c = client.subscribe("cron").await.unwrap();
    c.cancel();
    let expected: BTreeSet<Topic> = [Topic::chat("a"), Topic::entities()].into_iter().collect();

    let old = force_disconnect(&server);
    wait_resubscribed(&server, &old, &expected).await;
    assert_eq!(client.active_topics().into_iter().collect::<BTreeSet<_>>(), expected);
    client.shutdown().await;
}

#[tokio::test]
async fn missed_event_is_recovered_from_stub_store() {
    let (url, server) = boot_server().await;
    let store = Arc::new(StubStore::default());
    let client = Client::with_recovery_source(settings(&url), store.clone());
    client.wait_connected(TIMEOUT).await.unwrap();

    let topic = Topic::chat("session-42");
    let mut sub = client.subscribe(topic.as_str()).await.unwrap();

    for n in 1..=3 {
        let event = message(&topic, n);
        store.events.lock().push(event.clone());
        assert_eq!(server.hub().publish(&event).delivered, 1);
    }
    for n in 1..=3 {
        let event = timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(event.data["n"], n);
    }

    let old = force_disconnect(&server);
    let missed = message(&topic, 4);
    store.events.lock().push(missed.clone());
    assert_eq!(server.hub().publish(&missed).delivered, 0);

    let recovered = timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(recovered.id, missed.id);
    wait_resubscribed(&server, &old, &[topic.clone()].into_iter().collect()).await;

    // The inclusive bound returned the third event again; it was dropped.
    sleep(Duration::from_millis(100)).await;
    assert!(sub.try_recv().is_none());
    assert_eq!(store.queries.lock().as_slice(), &[topic]);
    client.shutdown().await;
}

#[tokio::test]
async fn live_event_before_recovery_does_not_skip_the_gap() {
    let (url, server) = boot_server().await;
    let store = Arc::new(GatedStore::default());
    let client = Client::with_recovery_source(settings(&url), store.clone());
    client.wait_connected(TIMEOUT).await.unwrap();

    let topic = Topic::chat("session-42");
    let mut sub = client.subscribe(topic.as_str()).await.unwrap();
    let seen = message(&topic, 3);
    store.inner.events.lock().push(seen.clone());
    assert_eq!(server.hub().publish(&seen).delivered, 1);
    assert_eq!(timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap().id, seen.id);

    let old = force_disconnect(&server);
    let missed = message(&topic, 4);
    store.inner.events.lock().push(missed.clone());
    assert_eq!(server.hub().publish(&missed).delivered, 0);

    // Recovery is held back, so the next event reaches the new connection first.
    wait_resubscribed(&server, &old, &[topic.clone()].into_iter().collect()).await;
    let live = message(&topic, 5);
    store.inner.events.lock().push(live.clone());
    assert_eq!(server.hub().publish(&live).delivered, 1);
    assert_eq!(timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap().id, live.id);

    store.open.notify_one();
    let recovered = timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(recovered.id, missed.id);

    sleep(Duration::from_millis(100)).await;
    assert!(sub.try_recv().is_none());
    client.shutdown().await;
}

#[tokio::test]
async fn missed_event_is_recovered_from_server_history() {
    let (url, server) = boot_server().await;
    let client = Client::start(settings(&url));
    client.wait_connected(TIMEOUT).await.unwrap();

    let topic = Topic::chat("journal");
    let mut sub = client.subscribe(topic.as_str()).await.unwrap();
    let live = message(&topic, 1);
    let _ = server.hub().publish(&live);
    assert_eq!(timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap().id, live.id);

    let _old = force_disconnect(&server);
    let missed = message(&topic, 2);
    let _ = server.hub().publish(&missed);

    let recovered = timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(recovered.id, missed.id);
    sleep(Duration::from_millis(100)).await;
    assert!(sub.try_recv().is_none());
    client.shutdown().await;
}

#[tokio::test]
async fn state_passes_through_backoff_on_disconnect() {
    let (url, server) = boot_server().await;
    let client = Client::start(settings(&url));
    client.wait_connected(TIMEOUT).await.unwrap();
    let mut states = client.watch_state();

    let _ = force_disconnect(&server);
    let seen = timeout(
        TIMEOUT,
        states.wait_for(|s| matches!(s, ClientState::Backoff { .. })),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_matches!(seen, ClientState::Backoff { reason, .. } if reason == "evicted");

    client.wait_connected(TIMEOUT).await.unwrap();
    client.shutdown().await;
}
