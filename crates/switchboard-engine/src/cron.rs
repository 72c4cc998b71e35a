//! Interval job scheduler.
//!
//! Each job posts its prompt into the target entity's conversation and
//! announces the firing on the `cron` topic. [`CronScheduler::tick`] is the
//! deterministic core; [`CronScheduler::run`] drives it from a timer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use switchboard_core::envelope::{EventEnvelope, now_millis};
use switchboard_core::ids::JobId;
use switchboard_core::topic::Topic;
use switchboard_core::types::CronJob;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::errors::{EngineError, Result};

/// Longest accepted period: one leap year.
pub const MAX_EVERY_SECS: u64 = 366 * 24 * 60 * 60;

/// `from + every_secs`, or `None` when the deadline is not representable.
fn due_after(from: Instant, every_secs: u64) -> Option<Instant> {
    from.checked_add(Duration::from_secs(every_secs))
}

struct Scheduled {
    job: CronJob,
    next_due: Instant,
}

/// Recurring prompts bound to entities.
pub struct CronScheduler {
    engine: Arc<Engine>,
    jobs: Mutex<BTreeMap<JobId, Scheduled>>,
}

impl CronScheduler {
    /// Scheduler posting into `engine`.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add a job firing every `every_secs` seconds, first after one period.
    ///
    /// `every_secs` must lie in `1..=MAX_EVERY_SECS`.
    pub fn schedule(&self, entity_id: &str, every_secs: u64, prompt: &str) -> Result<CronJob> {
        if !(1..=MAX_EVERY_SECS).contains(&every_secs) {
            return Err(EngineError::InvalidParams(format!(
                "everySecs must be within 1..={MAX_EVERY_SECS}"
            )));
        }
        if prompt.trim().is_empty() {
            return Err(EngineError::InvalidParams("prompt is empty".into()));
        }
        let entity = self.engine.entity(None, entity_id)?;
        let next_due = due_after(Instant::now(), every_secs)
            .ok_or_else(|| EngineError::InvalidParams("everySecs is out of range".into()))?;
        let job = CronJob {
            id: JobId::new(),
            entity_id: entity.id,
            every_secs,
            prompt: prompt.to_owned(),
            runs: 0,
            last_run: None,
        };
        let scheduled = Scheduled {
            job: job.clone(),
            next_due,
        };
        let _ = self.jobs.lock().insert(job.id.clone(), scheduled);
        info!(job_id = %job.id, entity_id, every_secs, "cron job scheduled");
        Ok(job)
    }

    /// Remove a job.
    pub fn remove(&self, id: &str) -> Result<CronJob> {
        let removed = self
            .jobs
            .lock()
            .remove(&JobId::from(id))
            .ok_or_else(|| EngineError::JobNotFound(id.to_owned()))?;
        info!(job_id = id, "cron job removed");
        Ok(removed.job)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<CronJob> {
        self.jobs.lock().values().map(|s| s.job.clone()).collect()
    }

    /// Fire every job due at `now`; returns the fired jobs.
    ///
    /// A job whose next deadline cannot be represented fires one last time
    /// and is dropped.
    pub fn tick(&self, now: Instant) -> Vec<CronJob> {
        let mut fired = Vec::new();
        {
            let mut jobs = self.jobs.lock();
            let mut spent = Vec::new();
            for (id, s) in jobs.iter_mut().filter(|(_, s)| s.next_due <= now) {
                s.job.runs += 1;
                s.job.last_run = Some(now_millis());
                fired.push(s.job.clone());
                match due_after(now, s.job.every_secs) {
                    Some(next) => s.next_due = next,
                    None => spent.push(id.clone()),
                }
            }
            for id in spent {
                warn!(job_id = %id, "cron job cannot be re-armed, dropping");
                let _ = jobs.remove(&id);
            }
        }

        for job in &fired {
            self.fire(job);
        }
        fired
    }

    fn fire(&self, job: &CronJob) {
        if let Err(e) = self.engine.post_system(job.entity_id.as_str(), &job.prompt) {
            warn!(job_id = %job.id, error = %e, "cron prompt rejected");
        }
        let data = serde_json::to_value(job).unwrap_or(Value::Null);
        let _ = self
            .engine
            .publish(&EventEnvelope::new(Topic::cron(), "cron.fired", data));
        debug!(job_id = %job.id, runs = job.runs, "cron job fired");
    }

    /// Tick every `period` until cancelled.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let _ = self.tick(Instant::now());
                }
                () = cancel.cancelled() => {
                    debug!("cron scheduler stopped");
                    return;
                }
            }
        }
    }
}
