//! Entity handlers: list, start, stop, create.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_core::commands::{CreateEntityParams, EntityParams};
use tracing::instrument;

use super::{parse_params, to_json};
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandHandler;
use crate::errors::CommandError;

/// Entities visible to the caller's tenant.
pub struct ListEntitiesHandler;

#[async_trait]
impl CommandHandler for ListEntitiesHandler {
    async fn handle(
        &self,
        _params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let entities = ctx.engine.list_entities(caller.tenant());
        Ok(json!({ "entities": to_json(&entities)? }))
    }
}

/// Move an entity to `running`.
pub struct StartEntityHandler;

#[async_trait]
impl CommandHandler for StartEntityHandler {
    #[instrument(skip_all, fields(command = "entities.start"))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let EntityParams { id } = parse_params(params)?;
        let entity = ctx.engine.start_entity(caller.tenant(), &id)?;
        to_json(&entity)
    }
}

/// Move an entity to `stopped`.
pub struct StopEntityHandler;

#[async_trait]
impl CommandHandler for StopEntityHandler {
    #[instrument(skip_all, fields(command = "entities.stop"))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let EntityParams { id } = parse_params(params)?;
        let entity = ctx.engine.stop_entity(caller.tenant(), &id)?;
        to_json(&entity)
    }
}

/// Register a new entity in the caller's tenant.
pub struct CreateEntityHandler;

#[async_trait]
impl CommandHandler for CreateEntityHandler {
    #[instrument(skip_all, fields(command = "entities.create"))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let CreateEntityParams { name } = parse_params(params)?;
        let entity = ctx.engine.create_entity(caller.tenant(), &name)?;
        to_json(&entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handlers::test_helpers::{
        make_caller, make_tenant_context, make_test_context, open_caller,
    };
    use assert_matches::assert_matches;
    use switchboard_core::errors::codes;
    use switchboard_core::types::{Entity, EntityStatus, Principal};

    fn first_entity_id(ctx: &ServerContext) -> String {
        ctx.engine.list_entities(None)[0].id.to_string()
    }

    #[tokio::test]
    async fn list_returns_seeded_entity() {
        let ctx = make_test_context();
        let result = ListEntitiesHandler
            .handle(json!({}), &make_caller(), &ctx)
            .await
            .unwrap();
        let entities: Vec<Entity> = serde_json::from_value(result["entities"].clone()).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "default");
    }

    #[tokio::test]
    async fn start_then_stop() {
        let ctx = make_test_context();
        let id = first_entity_id(&ctx);
        let started = StartEntityHandler
            .handle(json!({"id": id}), &make_caller(), &ctx)
            .await
            .unwrap();
        assert_eq!(started["status"], "running");
        let stopped = StopEntityHandler
            .handle(json!({"id": id}), &make_caller(), &ctx)
            .await
            .unwrap();
        assert_eq!(stopped["status"], "stopped");
    }

    #[tokio::test]
    async fn start_publishes_to_entities_topic() {
        let ctx = make_test_context();
        let caller = open_caller(&ctx, Principal::unscoped("t"));
        let _ = ctx.hub.subscribe(&caller.connection, "entities").unwrap();
        let id = first_entity_id(&ctx);
        let _ = StartEntityHandler
            .handle(json!({"id": id}), &caller, &ctx)
            .await
            .unwrap();
        let conn = ctx.hub.get(&caller.connection).unwrap();
        assert_eq!(conn.queue().pending_events().len(), 1);
        assert!(conn.queue().pending_events()[0].contains("entity.started"));
    }

    #[tokio::test]
    async fn start_unknown_entity() {
        let ctx = make_test_context();
        let err = StartEntityHandler
            .handle(json!({"id": "missing"}), &make_caller(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_registers_entity() {
        let ctx = make_test_context();
        let created = CreateEntityHandler
            .handle(json!({"name": "worker"}), &make_caller(), &ctx)
            .await
            .unwrap();
        let entity: Entity = serde_json::from_value(created).unwrap();
        assert_eq!(entity.name, "worker");
        assert_eq!(entity.status, EntityStatus::Idle);
        assert_eq!(ctx.engine.list_entities(None).len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let ctx = make_test_context();
        let err = CreateEntityHandler
            .handle(json!({"name": "  "}), &make_caller(), &ctx)
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::InvalidParams { .. });
    }

    #[tokio::test]
    async fn tenant_scoped_caller_sees_only_own_entities() {
        let ctx = make_tenant_context();
        let caller = open_caller(
            &ctx,
            Principal {
                subject: "alice".into(),
                tenant: Some("acme".into()),
            },
        );
        let result = ListEntitiesHandler.handle(json!({}), &caller, &ctx).await.unwrap();
        let entities: Vec<Entity> = serde_json::from_value(result["entities"].clone()).unwrap();
        assert!(entities.iter().all(|e| e.tenant.as_deref() != Some("globex")));
        assert!(entities.iter().any(|e| e.name == "acme-bot"));
    }
}
