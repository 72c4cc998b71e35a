//! `SwitchboardServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use switchboard_engine::{CronScheduler, Engine};
use switchboard_settings::EngineSettings;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{Authenticator, extract_credential};
use crate::commands::context::ServerContext;
use crate::commands::handlers::register_all;
use crate::commands::registry::CommandRegistry;
use crate::config::ServerConfig;
use crate::health::HealthReport;
use crate::metrics::{WS_REJECTED_TOTAL, render};
use crate::shutdown::Lifecycle;
use crate::websocket::heartbeat::HeartbeatMonitor;
use crate::websocket::hub::SubscriptionHub;
use crate::websocket::journal::Journal;
use crate::websocket::queue::CloseReason;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command handler dependencies.
    pub ctx: Arc<ServerContext>,
    /// Command registry.
    pub registry: Arc<CommandRegistry>,
    /// Handshake credential check.
    pub auth: Arc<dyn Authenticator>,
    /// Background task lifecycle.
    pub lifecycle: Arc<Lifecycle>,
    /// Prometheus handle for `/metrics` (`None` when no recorder is installed).
    pub metrics: Option<PrometheusHandle>,
    /// Connection cap.
    pub max_connections: usize,
    /// Inbound frame size cap.
    pub max_message_size: usize,
}

/// The Switchboard server.
pub struct SwitchboardServer {
    config: ServerConfig,
    ctx: Arc<ServerContext>,
    registry: Arc<CommandRegistry>,
    auth: Arc<dyn Authenticator>,
    lifecycle: Arc<Lifecycle>,
    metrics: Option<PrometheusHandle>,
}

impl SwitchboardServer {
    /// Create a server with a server-profile engine seeded from `engine`.
    pub fn new(
        config: ServerConfig,
        engine: &EngineSettings,
        auth: impl Authenticator + 'static,
    ) -> Self {
        let journal =
            Arc::new(Journal::new(config.journal_capacity).with_max_topics(config.journal_max_topics));
        let hub = Arc::new(SubscriptionHub::new(
            config.queue_capacity,
            config.backpressure,
            journal,
        ));
        let engine = Arc::new(Engine::server(engine, hub.clone()));
        let cron = Arc::new(CronScheduler::new(engine.clone()));
        let ctx = Arc::new(ServerContext::new(hub, engine, Some(cron)));

        let mut registry = CommandRegistry::new();
        register_all(&mut registry);

        Self {
            config,
            ctx,
            registry: Arc::new(registry),
            auth: Arc::new(auth),
            lifecycle: Arc::new(Lifecycle::new()),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: self.ctx.clone(),
            registry: self.registry.clone(),
            auth: self.auth.clone(),
            lifecycle: self.lifecycle.clone(),
            metrics: self.metrics.clone(),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind, start serving and start the heartbeat and scheduler loops.
    ///
    /// Every spawned loop is tracked by the server's [`Lifecycle`].
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.lifecycle.token();

        self.lifecycle.spawn("http", async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        let monitor = HeartbeatMonitor::new(
            self.ctx.hub.clone(),
            self.config.heartbeat_interval(),
            self.config.heartbeat_timeout(),
            self.config.sweep_interval(),
        );
        self.lifecycle
            .spawn("heartbeat", monitor.run(self.lifecycle.token()));

        if let Some(cron) = &self.ctx.cron {
            let tick = std::time::Duration::from_secs(self.config.cron_tick_secs.max(1));
            self.lifecycle
                .spawn("cron", cron.clone().run(tick, self.lifecycle.token()));
        }

        info!(%addr, "switchboard server listening");
        Ok(addr)
    }

    /// Close every connection with `server shutdown`, then stop all tasks.
    pub async fn stop(&self, timeout: Option<std::time::Duration>) {
        let closed = self.ctx.hub.close_all(CloseReason::Shutdown);
        info!(closed, "closing connections for shutdown");
        self.lifecycle.drain(timeout).await;
    }

    /// Get the subscription hub.
    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.ctx.hub
    }

    /// Get the engine.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.ctx.engine
    }

    /// Get the command context.
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Background task lifecycle.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the command registry.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    let report = HealthReport::snapshot(
        &state.ctx.hub,
        state.ctx.engine.profile().name,
        state.ctx.started_at,
        state.lifecycle.is_stopping(),
    );
    (report.status.http_status(), Json(report)).into_response()
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// GET /ws: authenticate, enforce the connection cap, then upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.lifecycle.is_stopping() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let credential = extract_credential(&headers, query.token.as_deref());
    let Some(principal) = state.auth.authenticate(credential.as_deref()) else {
        counter!(WS_REJECTED_TOTAL, "reason" => "unauthorized").increment(1);
        warn!(has_credential = credential.is_some(), "handshake rejected");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };

    let Some(conn) = state.ctx.hub.try_register(principal, state.max_connections) else {
        counter!(WS_REJECTED_TOTAL, "reason" => "limit").increment(1);
        warn!(limit = state.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let AppState { ctx, registry, .. } = state;
    let hub = ctx.hub.clone();
    let conn_id = conn.id.clone();
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(move |err| {
            warn!(conn_id = %conn_id, error = %err, "websocket upgrade failed");
            let _ = hub.close(&conn_id, CloseReason::ClientClosed);
        })
        .on_upgrade(move |socket| run_ws_session(socket, conn, registry, ctx))
}
