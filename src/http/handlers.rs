use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dispatch::{CallResult, Caller, SendRequest};
use crate::http::errors::ApiError;
use crate::http::server::AppState;
use crate::model::{CallRecord, Connector, JobExecution, ScheduledJob, Webhook, WebhookDelivery};
use crate::scheduler::{CreateJob, UpdateJob};
use crate::webhook::{RegisterWebhook, WebhookTestResult};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct PipelineStatus {
    pub name: String,
    pub breaker: String,
    pub in_flight: usize,
    pub queued: usize,
}

/// Webhook as listed to its owner; the signing secret is only returned at
/// registration.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSummary {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub is_enabled: bool,
    pub failure_count: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_response_status: Option<String>,
}

impl From<Webhook> for WebhookSummary {
    fn from(w: Webhook) -> Self {
        Self {
            id: w.id,
            name: w.name,
            url: w.url,
            events: w
                .events
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect(),
            is_enabled: w.is_enabled,
            failure_count: w.failure_count,
            last_triggered_at: w.last_triggered_at,
            last_response_status: w.last_response_status,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsBody {
    pub api_key: Option<String>,
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct EventBody {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineStatus>> {
    let statuses = state
        .engine
        .pipelines
        .all()
        .into_iter()
        .map(|p| PipelineStatus {
            name: p.name().to_string(),
            breaker: format!("{:?}", p.breaker().state()),
            in_flight: p.limiter().in_flight(),
            queued: p.limiter().queued(),
        })
        .collect();
    Json(statuses)
}

pub async fn reset_pipelines(State(state): State<AppState>) -> StatusCode {
    state.engine.pipelines.reset();
    tracing::info!("Resilience pipelines reset");
    StatusCode::NO_CONTENT
}

// Connectors and credentials

pub async fn list_connectors(State(state): State<AppState>) -> ApiResult<Vec<Connector>> {
    Ok(Json(state.engine.dispatcher.list_connectors().await?))
}

pub async fn register_connector(
    State(state): State<AppState>,
    Json(connector): Json<Connector>,
) -> Result<(StatusCode, Json<Connector>), ApiError> {
    let connector = state.engine.dispatcher.register_connector(connector).await?;
    Ok((StatusCode::CREATED, Json(connector)))
}

pub async fn put_credentials(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(connector_id): Path<Uuid>,
    Json(body): Json<CredentialsBody>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .dispatcher
        .store_credentials(&caller.user_id, connector_id, body.api_key.as_deref(), body.token.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Calls

pub async fn send_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<SendRequest>,
) -> ApiResult<CallResult> {
    Ok(Json(state.engine.dispatcher.send(request, &caller).await?))
}

pub async fn list_call_records(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<CallRecord>> {
    Ok(Json(state.engine.dispatcher.list_call_records(&caller.user_id).await?))
}

// Jobs

pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<ScheduledJob>> {
    Ok(Json(state.engine.scheduler.list_jobs(&caller.user_id).await?))
}

pub async fn create_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateJob>,
) -> Result<(StatusCode, Json<ScheduledJob>), ApiError> {
    let job = state.engine.scheduler.create_job(&caller.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> ApiResult<ScheduledJob> {
    Ok(Json(state.engine.scheduler.get_job(job_id).await?))
}

pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(update): Json<UpdateJob>,
) -> ApiResult<ScheduledJob> {
    Ok(Json(state.engine.scheduler.update_job(job_id, update).await?))
}

pub async fn delete_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.engine.scheduler.delete_job(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> ApiResult<ScheduledJob> {
    Ok(Json(state.engine.scheduler.toggle_job(job_id).await?))
}

pub async fn run_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.engine.scheduler.run_now(job_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_executions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Vec<JobExecution>> {
    Ok(Json(state.engine.scheduler.list_executions(job_id).await?))
}

// Webhooks

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<WebhookSummary>> {
    let webhooks = state.engine.notifier.list_webhooks(&caller.user_id).await?;
    Ok(Json(webhooks.into_iter().map(WebhookSummary::from).collect()))
}

pub async fn register_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<RegisterWebhook>,
) -> Result<(StatusCode, Json<Webhook>), ApiError> {
    let webhook = state.engine.notifier.register(&caller.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(webhook)))
}

pub async fn test_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
) -> ApiResult<WebhookTestResult> {
    Ok(Json(state.engine.notifier.test(webhook_id).await?))
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
) -> ApiResult<Vec<WebhookDelivery>> {
    Ok(Json(state.engine.notifier.list_deliveries(webhook_id).await?))
}

pub async fn retry_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> ApiResult<WebhookDelivery> {
    Ok(Json(state.engine.notifier.retry_delivery(delivery_id).await?))
}

pub async fn trigger_event(
    State(state): State<AppState>,
    Json(body): Json<EventBody>,
) -> ApiResult<Vec<WebhookDelivery>> {
    Ok(Json(state.engine.notifier.trigger(&body.event, body.data).await?))
}
