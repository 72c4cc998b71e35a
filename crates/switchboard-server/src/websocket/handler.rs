//! Inbound frame dispatch: decodes text as an envelope and routes commands
//! through the [`CommandRegistry`].

use metrics::counter;
use switchboard_core::envelope::{self, Envelope, ResponseEnvelope};
use tracing::{debug, instrument, warn};

use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandRegistry;
use crate::metrics::WS_MALFORMED_TOTAL;

/// Handle one inbound text frame.
///
/// Malformed envelopes are logged and dropped without a reply; the
/// connection is unaffected. Clients only send commands, so inbound events
/// and responses are ignored. Returns the response to queue, if any.
#[instrument(skip_all, fields(conn_id = %caller.connection, command))]
pub async fn handle_message(
    text: &str,
    registry: &CommandRegistry,
    caller: &Caller,
    ctx: &ServerContext,
) -> Option<ResponseEnvelope> {
    let command = match envelope::decode_str(text) {
        Ok(Envelope::Command(command)) => command,
        Ok(other) => {
            debug!(kind = other.kind(), "ignoring non-command envelope from client");
            return None;
        }
        Err(e) => {
            counter!(WS_MALFORMED_TOTAL).increment(1);
            warn!(error = %e, len = text.len(), "dropping malformed envelope");
            return None;
        }
    };

    let _ = tracing::Span::current().record("command", command.command.as_str());
    debug!(request_id = ?command.request_id, "dispatching command");
    registry.dispatch(command, caller, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handlers::register_all;
    use crate::commands::handlers::test_helpers::{make_test_context, open_caller};
    use serde_json::json;
    use switchboard_core::envelope::CommandEnvelope;
    use switchboard_core::errors::codes;
    use switchboard_core::types::Principal;

    fn make_registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        register_all(&mut registry);
        registry
    }

    fn encode_command(cmd: CommandEnvelope) -> String {
        envelope::encode(&Envelope::Command(cmd)).unwrap()
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let cmd = CommandEnvelope::request("ping", json!({}));
        let rid = cmd.request_id.clone().unwrap();
        let resp = handle_message(&encode_command(cmd), &make_registry(), &caller, &ctx)
            .await
            .unwrap();
        assert_eq!(resp.command, "pong");
        assert_eq!(resp.request_id, rid);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let registry = make_registry();
        for text in [
            "not json",
            "[]",
            r#"{"command":"ping"}"#,
            r#"{"type":"telegram","command":"ping"}"#,
            r#"{"type":"command"}"#,
        ] {
            assert!(handle_message(text, &registry, &caller, &ctx).await.is_none(), "{text}");
        }
        // The connection is untouched.
        assert_eq!(ctx.hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn client_events_are_ignored() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let text = r#"{"type":"event","topic":"system","event":"x","data":{},"timestamp":"2026-01-01T00:00:00.000Z","id":"e1"}"#;
        assert!(handle_message(text, &make_registry(), &caller, &ctx).await.is_none());
    }

    #[tokio::test]
    async fn subscribe_unknown_topic_yields_error_response() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let cmd = CommandEnvelope::request("subscribe", json!({"topic": "bogus:"}));
        let resp = handle_message(&encode_command(cmd), &make_registry(), &caller, &ctx)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, codes::UNKNOWN_TOPIC);
        assert_eq!(ctx.hub.connection_count(), 1);
    }
}
