//! Background task lifecycle: one cancellation token, named tasks, bounded drain.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Grace period used when `drain` is called without one.
const DEFAULT_GRACE: Duration = Duration::from_secs(10);

struct Tracked {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns the server's long-running loops (HTTP, heartbeat sweep, cron tick).
pub struct Lifecycle {
    token: CancellationToken,
    tasks: Mutex<Vec<Tracked>>,
}

impl Lifecycle {
    /// Fresh lifecycle with nothing running.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token every loop selects on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn `task` under `name` and keep its handle for `drain`.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "spawning background task");
        let handle = tokio::spawn(task);
        self.tasks.lock().push(Tracked { name, handle });
    }

    /// Names of tasks not yet drained, in spawn order.
    pub fn running(&self) -> Vec<&'static str> {
        self.tasks.lock().iter().map(|t| t.name).collect()
    }

    /// True once `stop` or `drain` has fired the token.
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token without waiting.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Fire the token and join every task before a shared deadline.
    ///
    /// Tasks still running at the deadline are aborted by name.
    pub async fn drain(&self, grace: Option<Duration>) {
        self.stop();
        let deadline = Instant::now() + grace.unwrap_or(DEFAULT_GRACE);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(tasks = tasks.len(), "draining background tasks");

        for Tracked { name, mut handle } in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "task finished"),
                Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "task missed the shutdown deadline, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
