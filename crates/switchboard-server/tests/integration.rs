//! End-to-end integration tests using a real WebSocket client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use switchboard_core::envelope::EventEnvelope;
use switchboard_core::topic::Topic;
use switchboard_core::types::Principal;
use switchboard_server::{ServerConfig, StaticTokenAuthenticator, SwitchboardServer};
use switchboard_settings::EngineSettings;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server and return the WS URL + the server.
async fn boot_with(
    config: ServerConfig,
    auth: StaticTokenAuthenticator,
) -> (String, SwitchboardServer) {
    let server = SwitchboardServer::new(config, &EngineSettings::default(), auth);
    let addr = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn boot_server() -> (String, SwitchboardServer) {
    boot_with(ServerConfig::default(), StaticTokenAuthenticator::open()).await
}

/// Connect and consume the `connection.established` notice.
async fn connect(url: &str) -> (WsStream, Value) {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let established = recv_json(&mut ws).await;
    assert_eq!(established["event"], "connection.established");
    (ws, established)
}

/// Next text frame as JSON, skipping control frames.
async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Send a correlated command and wait for its response, skipping events.
async fn request(ws: &mut WsStream, command: &str, data: Value) -> Value {
    let rid = next_request_id();
    send_json(
        ws,
        json!({"type": "command", "command": command, "data": data, "request_id": rid}),
    )
    .await;
    loop {
        let frame = recv_json(ws).await;
        if frame["type"] == "response" && frame["request_id"] == rid.as_str() {
            return frame;
        }
    }
}

fn next_request_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("req_{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

// ── Handshake ──

#[tokio::test]
async fn connect_receives_established_notice() {
    let (url, server) = boot_server().await;
    let (_ws, established) = connect(&url).await;
    assert_eq!(established["type"], "event");
    assert_eq!(established["topic"], "system");
    assert!(established["data"]["connectionId"].is_string());
    assert_eq!(established["data"]["subject"], "anonymous");
    assert_eq!(server.hub().connection_count(), 1);
}

#[tokio::test]
async fn missing_credential_is_rejected_with_401() {
    let auth = StaticTokenAuthenticator::default().with_token("s3cret", Principal::unscoped("ops"));
    let (url, server) = boot_with(ServerConfig::default(), auth).await;

    let err = connect_async(&url).await.unwrap_err();
    match err {
        WsError::Http(resp) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected HTTP 401, got {other:?}"),
    }
    assert_eq!(server.hub().connection_count(), 0);
}

#[tokio::test]
async fn bearer_header_and_query_token_both_authenticate() {
    let auth = StaticTokenAuthenticator::default().with_token("s3cret", Principal::unscoped("ops"));
    let (url, _server) = boot_with(ServerConfig::default(), auth).await;

    let mut req = url.as_str().into_client_request().unwrap();
    let _ = req
        .headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    let (mut ws, _) = connect_async(req).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["data"]["subject"], "ops");

    let (_ws, established) = connect(&format!("{url}?token=s3cret")).await;
    assert_eq!(established["data"]["subject"], "ops");
}

#[tokio::test]
async fn connection_cap_rejects_with_503() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (url, _server) = boot_with(config, StaticTokenAuthenticator::open()).await;
    let (_first, _) = connect(&url).await;

    match connect_async(&url).await.unwrap_err() {
        WsError::Http(resp) => assert_eq!(resp.status().as_u16(), 503),
        other => panic!("expected HTTP 503, got {other:?}"),
    }
}

// ── Subscriptions ──

#[tokio::test]
async fn subscribe_then_publish_delivers() {
    let (url, server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;

    let resp = request(&mut ws, "subscribe", json!({"topic": "chat:session-42"})).await;
    assert!(resp.get("error").is_none());
    assert_eq!(resp["data"]["topic"], "chat:session-42");

    let event = EventEnvelope::new(Topic::chat("session-42"), "message.created", json!({"n": 1}));
    let report = server.hub().publish(&event);
    assert_eq!(report.delivered, 1);

    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["id"], event.id.as_str());
    assert_eq!(frame["data"]["n"], 1);
}

#[tokio::test]
async fn unsubscribed_topics_are_not_delivered() {
    let (url, server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;
    let _ = request(&mut ws, "subscribe", json!({"topic": "entities"})).await;

    let _ = server
        .hub()
        .publish(&EventEnvelope::new(Topic::cron(), "job.ran", json!({})));
    let _ = server
        .hub()
        .publish(&EventEnvelope::new(Topic::entities(), "entity.started", json!({})));

    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["topic"], "entities");
}

#[tokio::test]
async fn unknown_topic_is_an_error_response_and_connection_survives() {
    let (url, _server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;

    let resp = request(&mut ws, "subscribe", json!({"topic": "chatt:1"})).await;
    assert_eq!(resp["error"]["code"], "UNKNOWN_TOPIC");

    let pong = request(&mut ws, "ping", json!({})).await;
    assert_eq!(pong["command"], "pong");
}

#[tokio::test]
async fn chat_send_fans_out_to_subscribers() {
    let (url, _server) = boot_server().await;
    let (mut watcher, _) = connect(&url).await;
    let (mut sender, _) = connect(&url).await;
    let _ = request(&mut watcher, "subscribe", json!({"topic": "chat:abc"})).await;

    let resp = request(&mut sender, "chat.send", json!({"context": "abc", "text": "hi"})).await;
    assert!(resp.get("error").is_none());
    let message_id = resp["data"]["message"]["id"].clone();

    let first = recv_json(&mut watcher).await;
    assert_eq!(first["event"], "message.created");
    assert_eq!(first["id"], message_id);
}

#[tokio::test]
async fn history_replays_journaled_events() {
    let (url, server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;

    let topic = Topic::chat("replay");
    let first = EventEnvelope::new(topic.clone(), "message.created", json!({"n": 1}));
    let second = EventEnvelope::new(topic, "message.created", json!({"n": 2}));
    let _ = server.hub().publish(&first);
    let _ = server.hub().publish(&second);

    let resp = request(&mut ws, "history", json!({"topic": "chat:replay"})).await;
    let events = resp["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["id"], first.id.as_str());
    assert_eq!(events[1]["id"], second.id.as_str());
}

// ── Malformed input ──

#[tokio::test]
async fn malformed_frame_is_dropped_without_reply() {
    let (url, server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;

    ws.send(Message::text("{not json")).await.unwrap();
    send_json(&mut ws, json!({"type": "telegram"})).await;

    let pong = request(&mut ws, "ping", json!({})).await;
    assert_eq!(pong["command"], "pong");
    assert_eq!(server.hub().connection_count(), 1);
}

#[tokio::test]
async fn binary_frame_is_dropped() {
    let (url, _server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;

    ws.send(Message::binary(vec![0xde, 0xad])).await.unwrap();
    let pong = request(&mut ws, "ping", json!({})).await;
    assert_eq!(pong["command"], "pong");
}

#[tokio::test]
async fn unknown_command_is_method_not_found() {
    let (url, _server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;
    let resp = request(&mut ws, "teleport", json!({})).await;
    assert_eq!(resp["error"]["code"], "METHOD_NOT_FOUND");
}

// ── Liveness and shutdown ──

#[tokio::test]
async fn silent_client_is_evicted_with_idle_timeout() {
    let config = ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        sweep_interval_secs: 1,
        ..ServerConfig::default()
    };
    let (url, server) = boot_with(config, StaticTokenAuthenticator::open()).await;
    let (mut ws, _) = connect(&url).await;

    // Not reading means probes go unanswered.
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let close = loop {
        match timeout(TIMEOUT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    let frame = close.expect("close frame carries a reason");
    assert_eq!(u16::from(frame.code), 4000);
    assert_eq!(frame.reason.as_str(), "idle timeout");
    assert_eq!(server.hub().connection_count(), 0);
}

#[tokio::test]
async fn stop_closes_clients_with_going_away() {
    let (url, server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;

    server.stop(Some(Duration::from_secs(2))).await;

    let close = loop {
        match timeout(TIMEOUT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    assert_eq!(u16::from(close.unwrap().code), 1001);
}

#[tokio::test]
async fn health_endpoint_over_http() {
    let (url, _server) = boot_server().await;
    let (mut ws, _) = connect(&url).await;
    let _ = request(&mut ws, "subscribe", json!({"topic": "system"})).await;

    let http = url.replace("ws://", "http://").replace("/ws", "/health");
    let body: Value = reqwest::get(&http).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["subscriptions"], 1);
}
