//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde_json::json;
use switchboard_core::commands::EVENT_CONNECTION_ESTABLISHED;
use switchboard_core::envelope::EventEnvelope;
use switchboard_core::topic::Topic;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::handle_message;
use super::queue::{CloseReason, Outbound};
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandRegistry;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_MALFORMED_TOTAL,
};

/// How long the writer gets to flush the close frame after the reader ends.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// The handshake-complete event sent directly to a new connection.
pub fn established_event(conn: &ClientConnection) -> EventEnvelope {
    EventEnvelope::new(
        Topic::system(),
        EVENT_CONNECTION_ESTABLISHED,
        json!({
            "connectionId": conn.id,
            "subject": conn.principal.subject,
        }),
    )
}

/// Run a WebSocket session for a registered connection.
///
/// 1. Queues `connection.established` (the handshake-complete signal)
/// 2. Opens the connection for fan-out
/// 3. Drains the outbound queue on a writer task
/// 4. Dispatches inbound text frames as commands; any frame counts as liveness
/// 5. Removes the connection from the hub on disconnect
#[instrument(skip_all, fields(conn_id = %conn.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn: Arc<ClientConnection>,
    registry: Arc<CommandRegistry>,
    ctx: Arc<ServerContext>,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let started = std::time::Instant::now();
    info!(subject = %conn.principal.subject, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let _ = ctx.hub.send_direct(&conn.id, &established_event(&conn));
    if ctx.hub.open(&conn.id).is_err() {
        warn!("connection removed before it opened");
    }

    let mut writer = tokio::spawn(write_loop(ws_tx, conn.clone()));
    let mut writer_done = false;
    let caller = Caller {
        connection: conn.id.clone(),
        principal: conn.principal.clone(),
    };

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                conn.touch();
                match msg {
                    Message::Text(text) => {
                        if let Some(response) = handle_message(text.as_str(), &registry, &caller, &ctx).await {
                            let _ = ctx.hub.send_reply(&conn.id, &response);
                        }
                    }
                    Message::Binary(data) => {
                        counter!(WS_MALFORMED_TOTAL).increment(1);
                        warn!(len = data.len(), "dropping binary frame");
                    }
                    Message::Close(_) => {
                        info!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    let _ = ctx.hub.close(&conn.id, CloseReason::ClientClosed);
    if !writer_done && tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    conn.mark_closed();

    info!("client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

async fn write_loop(mut ws_tx: SplitSink<WebSocket, Message>, conn: Arc<ClientConnection>) {
    while let Some(item) = conn.queue().next().await {
        let msg = match item {
            Outbound::Frame(text) => Message::Text(Utf8Bytes::from(text.as_ref())),
            Outbound::Probe => Message::Ping(Vec::new().into()),
            Outbound::Close(reason) => {
                debug!(reason = reason.as_str(), "sending close frame");
                let frame = CloseFrame {
                    code: reason.code(),
                    reason: Utf8Bytes::from_static(reason.as_str()),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }
        };
        if ws_tx.send(msg).await.is_err() {
            debug!("socket write failed");
            break;
        }
    }
}
