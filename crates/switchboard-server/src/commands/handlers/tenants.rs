//! Tenant directory handler.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::to_json;
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandHandler;
use crate::errors::CommandError;

/// Tenants the caller may see.
pub struct ListTenantsHandler;

#[async_trait]
impl CommandHandler for ListTenantsHandler {
    async fn handle(
        &self,
        _params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let tenants: Vec<_> = ctx
            .engine
            .tenants()?
            .into_iter()
            .filter(|t| caller.principal.can_see(Some(&t.id)))
            .collect();
        Ok(json!({ "tenants": to_json(&tenants)? }))
    }
}
