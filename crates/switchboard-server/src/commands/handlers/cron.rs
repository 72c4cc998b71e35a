//! Scheduler handlers: cron.list, cron.schedule, cron.remove.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_core::commands::{JobParams, ScheduleParams};
use switchboard_engine::CronScheduler;
use tracing::instrument;

use super::{parse_params, to_json};
use crate::commands::context::{Caller, ServerContext};
use crate::commands::registry::CommandHandler;
use crate::errors::CommandError;

fn scheduler(ctx: &ServerContext) -> Result<&Arc<CronScheduler>, CommandError> {
    ctx.cron.as_ref().ok_or_else(|| CommandError::Unsupported {
        operation: "cron".into(),
    })
}

/// All scheduled jobs.
pub struct ListJobsHandler;

#[async_trait]
impl CommandHandler for ListJobsHandler {
    async fn handle(
        &self,
        _params: Value,
        _caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let jobs = scheduler(ctx)?.list();
        Ok(json!({ "jobs": to_json(&jobs)? }))
    }
}

/// Add a recurring prompt for an entity visible to the caller.
pub struct ScheduleJobHandler;

#[async_trait]
impl CommandHandler for ScheduleJobHandler {
    #[instrument(skip_all, fields(command = "cron.schedule"))]
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let cron = scheduler(ctx)?;
        let ScheduleParams {
            entity_id,
            every_secs,
            prompt,
        } = parse_params(params)?;
        let _ = ctx.engine.entity(caller.tenant(), &entity_id)?;
        let job = cron.schedule(&entity_id, every_secs, &prompt)?;
        to_json(&job)
    }
}

/// Remove a job.
pub struct RemoveJobHandler;

#[async_trait]
impl CommandHandler for RemoveJobHandler {
    #[instrument(skip_all, fields(command = "cron.remove"))]
    async fn handle(
        &self,
        params: Value,
        _caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let cron = scheduler(ctx)?;
        let JobParams { id } = parse_params(params)?;
        let job = cron.remove(&id)?;
        to_json(&job)
    }
}
