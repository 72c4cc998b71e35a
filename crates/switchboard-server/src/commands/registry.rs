//! Command table and async dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use switchboard_core::envelope::{CommandEnvelope, ResponseEnvelope};
use tracing::{debug, error, warn};

use super::context::{Caller, ServerContext};
use crate::errors::CommandError;
use crate::metrics::{COMMAND_DURATION_SECONDS, COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};

/// One named command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run with the command's `data` payload.
    async fn handle(
        &self,
        params: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError>;
}

struct Route {
    handler: Arc<dyn CommandHandler>,
    /// Response name when it differs from the command (`ping` answers `pong`).
    reply_as: Option<String>,
}

/// Command name to handler, iterated in name order.
#[derive(Default)]
pub struct CommandRegistry {
    routes: BTreeMap<String, Route>,
}

impl CommandRegistry {
    /// Upper bound on one handler run.
    const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `command` to `handler`; the response reuses the command name.
    pub fn register(&mut self, command: &str, handler: impl CommandHandler + 'static) {
        self.insert(command, None, handler);
    }

    /// Route `command` to `handler`, answering under `reply_as`.
    pub fn register_with_reply(
        &mut self,
        command: &str,
        reply_as: &str,
        handler: impl CommandHandler + 'static,
    ) {
        self.insert(command, Some(reply_as.to_owned()), handler);
    }

    fn insert(
        &mut self,
        command: &str,
        reply_as: Option<String>,
        handler: impl CommandHandler + 'static,
    ) {
        let route = Route {
            handler: Arc::new(handler),
            reply_as,
        };
        if self.routes.insert(command.to_owned(), route).is_some() {
            warn!(command, "handler replaced");
        }
    }

    /// Execute `command` for `caller`.
    ///
    /// Commands without a `request_id` still run, but produce no response.
    pub async fn dispatch(
        &self,
        command: CommandEnvelope,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Option<ResponseEnvelope> {
        let CommandEnvelope {
            command: name,
            data,
            request_id,
        } = command;
        counter!(COMMANDS_TOTAL, "command" => name.clone()).increment(1);

        let (reply_name, outcome) = match self.routes.get(&name) {
            Some(route) => {
                let outcome = Self::run(route, &name, data, caller, ctx).await;
                (route.reply_as.clone().unwrap_or_else(|| name.clone()), outcome)
            }
            None => {
                warn!(command = %name, "unknown command");
                let missing = CommandError::MethodNotFound {
                    command: name.clone(),
                };
                (name.clone(), Err(missing))
            }
        };

        if let Err(err) = &outcome {
            counter!(COMMAND_ERRORS_TOTAL, "command" => name.clone(), "code" => err.code())
                .increment(1);
            debug!(command = %name, code = err.code(), error = %err, "command failed");
        }

        let request_id = request_id?;
        Some(match outcome {
            Ok(data) => ResponseEnvelope::ok(reply_name, request_id, data),
            Err(err) => {
                ResponseEnvelope::error(reply_name, request_id, err.code(), err.to_string())
            }
        })
    }

    async fn run(
        route: &Route,
        name: &str,
        data: Value,
        caller: &Caller,
        ctx: &ServerContext,
    ) -> Result<Value, CommandError> {
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(Self::HANDLER_TIMEOUT, route.handler.handle(data, caller, ctx))
                .await;
        histogram!(COMMAND_DURATION_SECONDS, "command" => name.to_owned())
            .record(started.elapsed().as_secs_f64());

        outcome.unwrap_or_else(|_| {
            error!(command = name, limit = ?Self::HANDLER_TIMEOUT, "handler timed out");
            Err(CommandError::Internal {
                message: format!("handler for '{name}' timed out"),
            })
        })
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// Whether `command` has a handler.
    pub fn has_command(&self, command: &str) -> bool {
        self.routes.contains_key(command)
    }
}
