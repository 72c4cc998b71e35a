//! Command handlers, grouped by domain.

pub mod builtin;
pub mod chat;
pub mod config;
pub mod cron;
pub mod entities;
pub mod tenants;

use serde::de::DeserializeOwned;
use serde_json::Value;
use switchboard_core::commands as names;

use super::registry::CommandRegistry;
use crate::errors::CommandError;

/// Deserialize command params into `T`, reporting `INVALID_PARAMS`.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, CommandError> {
    serde_json::from_value(params).map_err(|e| CommandError::InvalidParams {
        message: e.to_string(),
    })
}

/// Serialize a handler result.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| CommandError::Internal {
        message: e.to_string(),
    })
}

/// Registry with every built-in and domain command.
pub fn register_all(registry: &mut CommandRegistry) {
    registry.register(names::SUBSCRIBE, builtin::SubscribeHandler);
    registry.register(names::UNSUBSCRIBE, builtin::UnsubscribeHandler);
    registry.register_with_reply(names::PING, names::PONG, builtin::PingHandler);
    registry.register(names::HISTORY, builtin::HistoryHandler);

    registry.register(names::ENTITIES_LIST, entities::ListEntitiesHandler);
    registry.register(names::ENTITIES_START, entities::StartEntityHandler);
    registry.register(names::ENTITIES_STOP, entities::StopEntityHandler);
    registry.register(names::ENTITIES_CREATE, entities::CreateEntityHandler);

    registry.register(names::CHAT_SEND, chat::SendMessageHandler);
    registry.register(names::CHAT_HISTORY, chat::ChatHistoryHandler);

    registry.register(names::CONFIG_GET, config::GetConfigHandler);
    registry.register(names::CAPABILITIES_GET, config::GetCapabilitiesHandler);

    registry.register(names::CRON_LIST, cron::ListJobsHandler);
    registry.register(names::CRON_SCHEDULE, cron::ScheduleJobHandler);
    registry.register(names::CRON_REMOVE, cron::RemoveJobHandler);

    registry.register(names::TENANTS_LIST, tenants::ListTenantsHandler);
}
