//! Backend selection at startup.
//!
//! An explicit mode is honored as is. `auto` probes the server's `/health`
//! endpoint once with a short deadline and falls back to the local engine
//! on any failure. The choice is made once; nothing here switches a
//! running session between variants.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use switchboard_settings::{BackendMode, BackendSettings, SwitchboardSettings};
use tracing::{info, warn};

use crate::backend::{Backend, BackendKind};
use crate::errors::{AdapterError, Result};
use crate::local::LocalBackend;
use crate::remote::RemoteBackend;

/// Derive the health endpoint from a WebSocket URL.
///
/// `ws://host:port/ws` becomes `http://host:port/health`; `wss` maps to
/// `https`.
pub fn health_url(ws_url: &str) -> Result<Url> {
    let invalid = |reason: String| AdapterError::InvalidUrl {
        url: ws_url.to_owned(),
        reason,
    };
    let mut url = Url::parse(ws_url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    url.set_path("/health");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Picks the backend variant once.
pub struct ModeSelector {
    mode: BackendMode,
    probe_timeout: Duration,
    http: reqwest::Client,
}

impl ModeSelector {
    /// Selector for `settings`.
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            mode: settings.mode,
            probe_timeout: Duration::from_millis(settings.probe_timeout_ms),
            http: reqwest::Client::new(),
        }
    }

    /// The variant to use for a server at `ws_url`.
    pub async fn resolve(&self, ws_url: &str) -> BackendKind {
        match self.mode {
            BackendMode::Remote => BackendKind::Remote,
            BackendMode::Local => BackendKind::Local,
            BackendMode::Auto => {
                if self.probe(ws_url).await {
                    info!(url = ws_url, "server reachable, using remote backend");
                    BackendKind::Remote
                } else {
                    info!(url = ws_url, "server unreachable, using local backend");
                    BackendKind::Local
                }
            }
        }
    }

    /// Whether the server answers its health check within the deadline.
    pub async fn probe(&self, ws_url: &str) -> bool {
        let url = match health_url(ws_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot probe server");
                return false;
            }
        };
        match self
            .http
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "health probe rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, timeout = ?self.probe_timeout, "health probe failed");
                false
            }
        }
    }
}

/// Select a variant per `settings` and construct it.
pub async fn open_backend(settings: &SwitchboardSettings) -> Arc<dyn Backend> {
    let kind = ModeSelector::new(&settings.backend)
        .resolve(&settings.client.url)
        .await;
    match kind {
        BackendKind::Remote => Arc::new(RemoteBackend::connect(settings.client.clone()).await),
        BackendKind::Local => Arc::new(LocalBackend::from_settings(&settings.client)),
    }
}
