//! Protocol built-ins: subscribe, unsubscribe, ping, history.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_core::commands::{HistoryParams, HistoryResult, TopicParams};
use switchboard_core::envelope::now_millis;
use tracing::instrument;

use super::{parse_params, to_json};
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandHandler;
use crate::errors::CommandError;

/// Add a topic to the caller's subscription set.
pub struct SubscribeHandler;

#[async_trait]
impl CommandHandler for SubscribeHandler {
    #[instrument(skip_all, fields(command = "subscribe", conn_id = %caller.connection))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let TopicParams { topic } = parse_params(params)?;
        let topic = ctx.hub.subscribe(&caller.connection, &topic)?;
        Ok(json!({ "topic": topic }))
    }
}

/// Remove a topic from the caller's subscription set.
pub struct UnsubscribeHandler;

#[async_trait]
impl CommandHandler for UnsubscribeHandler {
    #[instrument(skip_all, fields(command = "unsubscribe", conn_id = %caller.connection))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let TopicParams { topic } = parse_params(params)?;
        let topic = ctx.hub.unsubscribe(&caller.connection, &topic)?;
        Ok(json!({ "topic": topic }))
    }
}

/// Application-level liveness check; answered as `pong`.
pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(
        &self,
        _params: Value,
        _caller: &Caller,
        _ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        Ok(json!({ "timestamp": now_millis() }))
    }
}

/// Journaled events of a topic at or after a timestamp.
pub struct HistoryHandler;

#[async_trait]
impl CommandHandler for HistoryHandler {
    #[instrument(skip_all, fields(command = "history"))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let HistoryParams {
            topic,
            after,
            limit,
        } = parse_params(params)?;
        let topic = ctx.hub.check_topic(&caller.principal, &topic)?;
        let events = ctx.hub.journal().since(&topic, after, limit);
        to_json(&HistoryResult { events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handlers::test_helpers::{make_caller, make_test_context, open_caller};
    use assert_matches::assert_matches;
    use switchboard_core::envelope::EventEnvelope;
    use switchboard_core::topic::Topic;
    use switchboard_core::types::Principal;

    #[tokio::test]
    async fn subscribe_adds_topic() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let result = SubscribeHandler
            .handle(json!({"topic": "chat:session-42"}), &caller, &ctx)
            .await
            .unwrap();
        assert_eq!(result["topic"], "chat:session-42");
        assert_eq!(
            ctx.hub.subscriptions_of(&caller.connection).unwrap(),
            vec![Topic::chat("session-42")]
        );
    }

    #[tokio::test]
    async fn subscribe_unknown_topic() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let err = SubscribeHandler
            .handle(json!({"topic": "weather"}), &caller, &ctx)
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::UnknownTopic { ref topic } if topic == "weather");
    }

    #[tokio::test]
    async fn subscribe_missing_topic_param() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let err = SubscribeHandler.handle(json!({}), &caller, &ctx).await.unwrap_err();
        assert_matches!(err, CommandError::InvalidParams { .. });
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let _ = SubscribeHandler
            .handle(json!({"topic": "entities"}), &caller, &ctx)
            .await
            .unwrap();
        for _ in 0..2 {
            let _ = UnsubscribeHandler
                .handle(json!({"topic": "entities"}), &caller, &ctx)
                .await
                .unwrap();
        }
        assert!(ctx.hub.subscriptions_of(&caller.connection).unwrap().is_empty());
    }

    #[tokio::test]
    async fn ping_returns_timestamp() {
        let ctx = make_test_context();
        let result = PingHandler.handle(json!({}), &make_caller(), &ctx).await.unwrap();
        assert!(result["timestamp"].is_string());
    }

    #[tokio::test]
    async fn history_returns_events_after_bound() {
        let ctx = make_test_context();
        let topic = Topic::chat("s1");
        let first = EventEnvelope::new(topic.clone(), "message.created", json!({"n": 1}));
        let mut second = EventEnvelope::new(topic.clone(), "message.created", json!({"n": 2}));
        second.timestamp = first.timestamp + chrono::TimeDelta::milliseconds(5);
        let _ = ctx.hub.publish(&first);
        let _ = ctx.hub.publish(&second);

        let result = HistoryHandler
            .handle(
                json!({"topic": "chat:s1", "after": second.timestamp}),
                &make_caller(),
                &ctx,
            )
            .await
            .unwrap();
        let parsed: HistoryResult = serde_json::from_value(result).unwrap();
        assert_eq!(parsed.events, vec![second]);
    }

    #[tokio::test]
    async fn history_rejects_unknown_topic() {
        let ctx = make_test_context();
        let err = HistoryHandler
            .handle(json!({"topic": "nope:x"}), &make_caller(), &ctx)
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::UnknownTopic { .. });
    }
}
