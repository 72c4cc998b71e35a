//! Conversation handlers: send, history.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_core::commands::{ChatHistoryParams, SendMessageParams};
use tracing::instrument;

use super::{parse_params, to_json};
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandHandler;
use crate::errors::CommandError;

/// Post a user message; the reply is published on the context's topic.
pub struct SendMessageHandler;

#[async_trait]
impl CommandHandler for SendMessageHandler {
    #[instrument(skip_all, fields(command = "chat.send"))]
    async fn handle(
        &self,
        params: Value,
        _caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let SendMessageParams { context, text } = parse_params(params)?;
        let exchange = ctx.engine.send_message(&context, &text)?;
        to_json(&exchange)
    }
}

/// Items of a context at or after `after`: the recovery query.
pub struct ChatHistoryHandler;

#[async_trait]
impl CommandHandler for ChatHistoryHandler {
    async fn handle(
        &self,
        params: Value,
        _caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let ChatHistoryParams { context, after } = parse_params(params)?;
        let items = ctx.engine.history(&context, after)?;
        Ok(json!({ "items": to_json(&items)? }))
    }
}
