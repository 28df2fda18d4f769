//! Job lifecycle and firing.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::clock::Clock;
use super::cron;
use super::trigger::{FireFn, TriggerSubstrate};
use crate::config::LimitsConfig;
use crate::dispatch::request::truncate_chars;
use crate::dispatch::{CallOutcome, CallSpec, Dispatcher};
use crate::error::{ConfigurationError, DispatchResult};
use crate::model::{ExecutionStatus, HttpMethod, JobExecution, ScheduledJob};
use crate::observability::metrics;
use crate::store::{ConnectorStore, ExecutionStore, JobRepository, JobStore, StoreError};

pub const EXECUTION_TRUNCATION_MARKER: &str = "... [truncated]";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJob {
    pub connector_id: Uuid,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    pub cron_expression: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJob {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
    pub query_params: Option<BTreeMap<String, String>>,
    pub cron_expression: Option<String>,
    pub is_enabled: Option<bool>,
}

/// What caused a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Schedule,
    Manual,
}

pub struct Scheduler {
    store: Arc<dyn JobRepository>,
    dispatcher: Arc<Dispatcher>,
    substrate: Arc<dyn TriggerSubstrate>,
    clock: Arc<dyn Clock>,
    limits: LimitsConfig,
    /// Serializes management of one job so the stored flag and the trigger
    /// registration change together.
    job_locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
    this: Weak<Scheduler>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobRepository>,
        dispatcher: Arc<Dispatcher>,
        substrate: Arc<dyn TriggerSubstrate>,
        clock: Arc<dyn Clock>,
        limits: LimitsConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            dispatcher,
            substrate,
            clock,
            limits,
            job_locks: DashMap::new(),
            this: this.clone(),
        })
    }

    pub async fn create_job(&self, owner: &str, request: CreateJob) -> DispatchResult<ScheduledJob> {
        cron::validate(&request.cron_expression)?;
        if self.store.get_connector(request.connector_id).await?.is_none() {
            return Err(ConfigurationError::ConnectorNotFound(request.connector_id).into());
        }

        let now = self.clock.now();
        let next_run_at = if request.is_enabled {
            Some(cron::next_occurrence(&request.cron_expression, now)?)
        } else {
            None
        };

        let job = ScheduledJob {
            id: Uuid::new_v4(),
            user_id: owner.to_string(),
            connector_id: request.connector_id,
            name: request.name,
            endpoint: request.endpoint,
            method: request.method,
            headers: request.headers,
            body: request.body,
            query_params: request.query_params,
            cron_expression: request.cron_expression,
            is_enabled: request.is_enabled,
            last_run_at: None,
            next_run_at,
            last_run_status: None,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_job(job.clone()).await?;
        if job.is_enabled {
            self.substrate
                .register(job.id, &job.cron_expression, self.fire_fn(Trigger::Schedule))?;
        }

        tracing::info!(job_id = %job.id, name = %job.name, cron = %job.cron_expression, enabled = job.is_enabled, "Job created");
        Ok(job)
    }

    pub async fn update_job(&self, job_id: Uuid, update: UpdateJob) -> DispatchResult<ScheduledJob> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        self.job(job_id).await?;
        if let Some(expression) = &update.cron_expression {
            cron::validate(expression)?;
        }
        let now = self.clock.now();

        let job = self
            .store
            .update_job(
                job_id,
                Box::new(move |job| {
                    if let Some(name) = update.name {
                        job.name = name;
                    }
                    if let Some(endpoint) = update.endpoint {
                        job.endpoint = endpoint;
                    }
                    if let Some(method) = update.method {
                        job.method = method;
                    }
                    if let Some(headers) = update.headers {
                        job.headers = headers;
                    }
                    if update.body.is_some() {
                        job.body = update.body;
                    }
                    if let Some(query_params) = update.query_params {
                        job.query_params = query_params;
                    }
                    if let Some(cron_expression) = update.cron_expression {
                        job.cron_expression = cron_expression;
                    }
                    if let Some(enabled) = update.is_enabled {
                        job.is_enabled = enabled;
                    }
                    job.next_run_at = next_run_after(job, now);
                    job.updated_at = now;
                }),
            )
            .await
            .map_err(|e| not_found_as_job(e, job_id))?;

        self.sync_trigger(&job)?;
        tracing::info!(job_id = %job.id, cron = %job.cron_expression, enabled = job.is_enabled, "Job updated");
        Ok(job)
    }

    /// Flip `is_enabled`.
    pub async fn toggle_job(&self, job_id: Uuid) -> DispatchResult<ScheduledJob> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let job = self
            .store
            .update_job(
                job_id,
                Box::new(move |job| {
                    job.is_enabled = !job.is_enabled;
                    job.next_run_at = next_run_after(job, now);
                    job.updated_at = now;
                }),
            )
            .await
            .map_err(|e| not_found_as_job(e, job_id))?;

        self.sync_trigger(&job)?;
        tracing::info!(job_id = %job.id, enabled = job.is_enabled, "Job toggled");
        Ok(job)
    }

    pub async fn delete_job(&self, job_id: Uuid) -> DispatchResult<()> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        self.job(job_id).await?;
        self.substrate.unregister(job_id);
        if !self.store.delete_job(job_id).await? {
            return Err(ConfigurationError::JobNotFound(job_id).into());
        }
        self.job_locks.remove(&job_id);
        tracing::info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Fire once, now, regardless of schedule or enabled state.
    pub async fn run_now(&self, job_id: Uuid) -> DispatchResult<()> {
        self.job(job_id).await?;
        self.substrate.fire_now(job_id, self.fire_fn(Trigger::Manual));
        tracing::info!(job_id = %job_id, "Job run requested");
        Ok(())
    }

    /// Register every enabled job. Returns how many were registered.
    pub async fn register_all(&self) -> DispatchResult<usize> {
        let mut registered = 0;
        for job in self.store.list_jobs().await? {
            if !job.is_enabled {
                continue;
            }
            match self
                .substrate
                .register(job.id, &job.cron_expression, self.fire_fn(Trigger::Schedule))
            {
                Ok(()) => registered += 1,
                Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to register job"),
            }
        }
        tracing::info!(registered, "Scheduled jobs registered");
        Ok(registered)
    }

    pub async fn get_job(&self, job_id: Uuid) -> DispatchResult<ScheduledJob> {
        self.job(job_id).await
    }

    pub async fn list_jobs(&self, owner: &str) -> DispatchResult<Vec<ScheduledJob>> {
        let jobs = self.store.list_jobs().await?;
        Ok(jobs.into_iter().filter(|j| j.user_id == owner).collect())
    }

    pub async fn list_executions(&self, job_id: Uuid) -> DispatchResult<Vec<JobExecution>> {
        self.job(job_id).await?;
        Ok(self.store.list_executions(job_id).await?)
    }

    /// Execute one scheduled firing. Never fails; problems end up in the
    /// execution record or the log.
    pub async fn fire(&self, job_id: Uuid) -> Option<JobExecution> {
        self.fire_with(job_id, Trigger::Schedule).await
    }

    async fn fire_with(&self, job_id: Uuid, trigger: Trigger) -> Option<JobExecution> {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Fired job no longer exists, skipping");
                return None;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
                return None;
            }
        };
        if trigger == Trigger::Schedule && !job.is_enabled {
            tracing::info!(job_id = %job_id, "Job disabled, skipping firing");
            return None;
        }

        let execution = JobExecution::start(job.id, self.clock.now());
        let execution_id = execution.id;
        if let Err(e) = self.store.insert_execution(execution).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record execution start");
            return None;
        }

        let started = Instant::now();
        let outcome = self.dispatch(&job).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let completed_at = self.clock.now();

        let (status, http_status_code, response_body, error_message) = match &outcome {
            Ok(outcome) if outcome.is_success => (
                ExecutionStatus::Success,
                Some(outcome.status_code),
                self.truncate(outcome.body.as_deref()),
                None,
            ),
            Ok(outcome) => (
                ExecutionStatus::Failed,
                (outcome.status_code != 0).then_some(outcome.status_code),
                self.truncate(outcome.body.as_deref()),
                Some(
                    outcome
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("HTTP {}", outcome.status_code)),
                ),
            ),
            Err(e) => (ExecutionStatus::Failed, None, None, Some(e.to_string())),
        };
        let success = status == ExecutionStatus::Success;

        let finalized = self
            .store
            .update_execution(
                execution_id,
                Box::new(move |execution| {
                    execution.status = status;
                    execution.completed_at = Some(completed_at);
                    execution.http_status_code = http_status_code;
                    execution.response_body = response_body;
                    execution.error_message = error_message;
                    execution.duration_ms = Some(duration_ms);
                }),
            )
            .await;

        let next_run_at = cron::next_occurrence(&job.cron_expression, completed_at).ok();
        let counters = self
            .store
            .update_job(
                job_id,
                Box::new(move |job| {
                    if success {
                        job.success_count += 1;
                    } else {
                        job.failure_count += 1;
                    }
                    job.last_run_status = Some(status);
                    job.last_run_at = Some(completed_at);
                    job.next_run_at = if job.is_enabled { next_run_at } else { None };
                    job.updated_at = completed_at;
                }),
            )
            .await;
        if let Err(e) = counters {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to update job after firing");
        }

        metrics::record_job_run(success);
        tracing::info!(
            job_id = %job_id,
            execution_id = %execution_id,
            status = ?status,
            duration_ms,
            manual = trigger == Trigger::Manual,
            "Job fired"
        );

        match finalized {
            Ok(execution) => Some(execution),
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "Failed to finalize execution");
                None
            }
        }
    }

    async fn dispatch(&self, job: &ScheduledJob) -> DispatchResult<CallOutcome> {
        let connector = self.dispatcher.active_connector(job.connector_id).await?;
        let spec = CallSpec {
            endpoint: job.endpoint.clone(),
            method: job.method,
            headers: job.headers.clone(),
            body: job.body.clone(),
            query_params: job.query_params.clone(),
        };
        self.dispatcher.execute(&connector, &spec, &job.user_id).await
    }

    async fn job(&self, job_id: Uuid) -> DispatchResult<ScheduledJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ConfigurationError::JobNotFound(job_id).into())
    }

    fn job_lock(&self, job_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.job_locks.entry(job_id).or_default().clone()
    }

    fn sync_trigger(&self, job: &ScheduledJob) -> Result<(), ConfigurationError> {
        if job.is_enabled {
            self.substrate
                .register(job.id, &job.cron_expression, self.fire_fn(Trigger::Schedule))
        } else {
            self.substrate.unregister(job.id);
            Ok(())
        }
    }

    fn truncate(&self, body: Option<&str>) -> Option<String> {
        body.map(|b| truncate_chars(b, self.limits.execution_body_chars, EXECUTION_TRUNCATION_MARKER))
    }

    fn fire_fn(&self, trigger: Trigger) -> FireFn {
        let this = self.this.clone();
        Arc::new(move |job_id| {
            let this = this.clone();
            Box::pin(async move {
                if let Some(scheduler) = this.upgrade() {
                    scheduler.fire_with(job_id, trigger).await;
                }
            })
        })
    }
}

/// Next firing for an enabled job, none while disabled. Stored expressions
/// were validated on the way in.
fn next_run_after(job: &ScheduledJob, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if job.is_enabled {
        cron::next_occurrence(&job.cron_expression, now).ok()
    } else {
        None
    }
}

fn not_found_as_job(error: StoreError, job_id: Uuid) -> crate::error::DispatchError {
    match error {
        StoreError::NotFound(_) => ConfigurationError::JobNotFound(job_id).into(),
        other => other.into(),
    }
}
