//! Configuration handlers: config.get, capabilities.get.

use async_trait::async_trait;
use serde_json::Value;

use super::to_json;
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandHandler;
use crate::errors::CommandError;

/// Public configuration view plus uptime.
pub struct GetConfigHandler;

#[async_trait]
impl CommandHandler for GetConfigHandler {
    async fn handle(
        &self,
        _params: Value,
        _caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let mut config = ctx.engine.config();
        if let Some(obj) = config.as_object_mut() {
            let _ = obj.insert(
                "uptimeSecs".into(),
                Value::from(ctx.started_at.elapsed().as_secs()),
            );
            let _ = obj.insert("capabilities".into(), to_json(&ctx.capabilities)?);
        }
        Ok(config)
    }
}

/// The server's capability map.
pub struct GetCapabilitiesHandler;

#[async_trait]
impl CommandHandler for GetCapabilitiesHandler {
    async fn handle(
        &self,
        _params: Value,
        _caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        to_json(&ctx.capabilities)
    }
}
