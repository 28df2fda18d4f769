//! Trigger substrate: turns cron registrations into firings.
//!
//! # Responsibilities
//! - Keep one timer task per registered job id
//! - Fire at each cron occurrence until unregistered or shut down
//! - Allow at most one concurrent firing per job id
//!
//! # Design Decisions
//! - Registering an already registered id replaces the previous timer
//! - Each firing runs in its own task, so unregistering never cancels a
//!   firing that has already started
//! - A tick that lands while the previous firing is still running is
//!   skipped, not queued

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ::cron::Schedule;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::clock::Clock;
use super::cron;
use crate::error::ConfigurationError;
use crate::lifecycle::Shutdown;

/// Callback invoked with the job id on every firing.
pub type FireFn = Arc<dyn Fn(Uuid) -> BoxFuture<'static, ()> + Send + Sync>;

/// Scheduling capability the scheduler depends on.
pub trait TriggerSubstrate: Send + Sync {
    /// Start (or restart) firing `job_id` on `cron_expression`.
    fn register(&self, job_id: Uuid, cron_expression: &str, fire: FireFn) -> Result<(), ConfigurationError>;

    /// Stop firing `job_id`. Unknown ids are ignored.
    fn unregister(&self, job_id: Uuid);

    /// Fire `job_id` once, immediately, outside its schedule.
    fn fire_now(&self, job_id: Uuid, fire: FireFn);
}

/// Tokio-task-backed substrate.
pub struct TokioTriggerSubstrate {
    timers: DashMap<Uuid, JoinHandle<()>>,
    gates: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
}

impl TokioTriggerSubstrate {
    pub fn new(clock: Arc<dyn Clock>, shutdown: Shutdown) -> Self {
        Self {
            timers: DashMap::new(),
            gates: Arc::new(DashMap::new()),
            clock,
            shutdown,
        }
    }

    pub fn is_registered(&self, job_id: Uuid) -> bool {
        self.timers.get(&job_id).is_some_and(|h| !h.is_finished())
    }

    pub fn registered_count(&self) -> usize {
        self.timers.iter().filter(|h| !h.is_finished()).count()
    }

    fn spawn_gated(gates: &Arc<DashMap<Uuid, Arc<Mutex<()>>>>, job_id: Uuid, fire: FireFn) {
        let gate = gates.entry(job_id).or_default().clone();
        tokio::spawn(async move {
            let Ok(_running) = gate.try_lock() else {
                tracing::info!(job_id = %job_id, "Previous firing still running, skipping");
                return;
            };
            fire(job_id).await;
        });
    }
}

impl TriggerSubstrate for TokioTriggerSubstrate {
    fn register(&self, job_id: Uuid, cron_expression: &str, fire: FireFn) -> Result<(), ConfigurationError> {
        let schedule = cron::parse(cron_expression)?;
        let clock = self.clock.clone();
        let gates = self.gates.clone();
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut last_fired = None;
            loop {
                let now = clock.now();
                let Some(next) = next_tick(&schedule, now, last_fired) else {
                    tracing::warn!(job_id = %job_id, "Cron schedule exhausted");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        tracing::debug!(job_id = %job_id, scheduled_for = %next, fired_at = %Utc::now(), "Cron tick");
                        last_fired = Some(next);
                        Self::spawn_gated(&gates, job_id, fire.clone());
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(job_id = %job_id, "Trigger stopped by shutdown");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.timers.insert(job_id, handle) {
            previous.abort();
        }
        tracing::debug!(job_id = %job_id, cron = cron_expression, "Trigger registered");
        Ok(())
    }

    fn unregister(&self, job_id: Uuid) {
        if let Some((_, handle)) = self.timers.remove(&job_id) {
            handle.abort();
            tracing::debug!(job_id = %job_id, "Trigger unregistered");
        }
    }

    fn fire_now(&self, job_id: Uuid, fire: FireFn) {
        Self::spawn_gated(&self.gates, job_id, fire);
    }
}

/// First occurrence after both `now` and the last fired tick. Sleeping runs
/// on tokio's clock while `now` comes from the wall clock, so a wake-up can
/// land just before the tick it was waiting for.
fn next_tick(schedule: &Schedule, now: DateTime<Utc>, last_fired: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    let from = last_fired.map_or(now, |fired| fired.max(now));
    schedule.after(&from).next()
}

impl Drop for TokioTriggerSubstrate {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}
