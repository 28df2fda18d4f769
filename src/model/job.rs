//! Scheduled jobs and their execution history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connector::HttpMethod;

/// A fixed request replayed on a cron schedule under its owner's credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    /// Owner; the job dispatches with this user's secrets.
    pub user_id: String,
    pub connector_id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub query_params: BTreeMap<String, String>,
    pub cron_expression: String,
    pub is_enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    /// `None` iff the job is disabled.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<ExecutionStatus>,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

/// One firing of a scheduled job. Created `Running`, finalized once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub scheduled_job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub http_status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl JobExecution {
    pub fn start(scheduled_job_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scheduled_job_id,
            started_at,
            completed_at: None,
            status: ExecutionStatus::Running,
            http_status_code: None,
            response_body: None,
            error_message: None,
            duration_ms: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status != ExecutionStatus::Running
    }
}
