//! # switchboard-agent
//!
//! Switchboard server binary: loads settings, starts logging and metrics,
//! builds the engine and server, and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_core::logging::init_subscriber;
use switchboard_server::metrics::install_recorder;
use switchboard_server::{ServerConfig, StaticTokenAuthenticator, SwitchboardServer};
use switchboard_settings::SwitchboardSettings;

/// Time allowed for background tasks to finish after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Switchboard event distribution server.
#[derive(Parser, Debug)]
#[command(name = "switchboard-agent", about = "Switchboard event distribution server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.switchboard/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn load(cli: &Cli) -> Result<SwitchboardSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(switchboard_settings::settings_path);
    let mut settings = switchboard_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn build_server(settings: &SwitchboardSettings) -> SwitchboardServer {
    let auth = StaticTokenAuthenticator::from_settings(&settings.server.auth);
    SwitchboardServer::new(
        ServerConfig::from_settings(&settings.server),
        &settings.engine,
        auth,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    init_subscriber(&settings.logging.level, settings.logging.format);

    let mut server = build_server(&settings);
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        entities = settings.engine.entities.len(),
        tenants = settings.engine.tenants.len(),
        "switchboard listening"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(Some(SHUTDOWN_GRACE)).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
