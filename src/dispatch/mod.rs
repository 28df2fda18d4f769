//! Connector call dispatch.
//!
//! # Data Flow
//! ```text
//! SendRequest + Caller
//!     → resolve connector (not found / inactive → ConfigurationError)
//!     → request.rs (build URL, merge headers, attach JSON body)
//!     → vault (decrypt the caller's secret, if any)
//!     → auth strategy (header / query mutation)
//!     → resilience pipeline for the connector
//!     → CallRecord (+ Dataset) persisted, event published
//!     → CallResult
//! ```
//!
//! # Design Decisions
//! - Network failures are outcomes, not errors: they end up in the record
//!   with status 0
//! - The recorded URL is captured before authentication, so query-string
//!   secrets are never persisted
//! - Recorded headers are the caller's, sanitized; auth headers added by the
//!   strategy are never recorded
//! - A missing secret sends the call unauthenticated and logs a warning

pub mod request;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthOutcome, AuthStrategy};
use crate::config::validation::validate_connector;
use crate::config::LimitsConfig;
use crate::error::{ConfigurationError, DispatchResult};
use crate::model::{CallRecord, Connector, Dataset, HttpMethod, UserSecret};
use crate::observability::metrics;
use crate::resilience::{CallPolicy, PipelineRegistry};
use crate::store::{CallRecordStore, ConnectorStore, DatasetStore, DispatchStore, SecretStore};
use crate::transport::{OutboundRequest, Transport};
use crate::vault::{Credentials, Vault};
use crate::webhook::events::{self, EventPublisher};

use request::{build_url, count_json_records, sanitize_headers, truncate_chars};

const RECORD_TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// An ad-hoc call against a connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendRequest {
    pub connector_id: Uuid,
    pub endpoint: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub query_params: BTreeMap<String, String>,
    pub save_as_dataset: bool,
}

/// Who is calling, and under which correlation id.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub correlation_id: Option<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            correlation_id: None,
        }
    }
}

/// What the caller gets back from `send`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub record_id: Uuid,
    pub correlation_id: String,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub duration_ms: u64,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub dataset_id: Option<Uuid>,
}

/// The request half of a call, shared by ad-hoc sends and scheduled jobs.
#[derive(Debug, Clone, Default)]
pub struct CallSpec {
    pub endpoint: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub query_params: BTreeMap<String, String>,
}

/// Result of running a call through the pipeline, before any recording.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// URL as built, before authentication.
    pub url: String,
    /// `0` when no response was received.
    pub status_code: u16,
    pub reason: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub duration_ms: u64,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

pub struct Dispatcher {
    store: Arc<dyn DispatchStore>,
    vault: Arc<dyn Vault>,
    transport: Arc<dyn Transport>,
    pipelines: Arc<PipelineRegistry>,
    limits: LimitsConfig,
    events: Option<Arc<dyn EventPublisher>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        vault: Arc<dyn Vault>,
        transport: Arc<dyn Transport>,
        pipelines: Arc<PipelineRegistry>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            store,
            vault,
            transport,
            pipelines,
            limits,
            events: None,
        }
    }

    /// Publish `api.request.*` events after every recorded call.
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn pipelines(&self) -> &Arc<PipelineRegistry> {
        &self.pipelines
    }

    /// Look up a connector and require it to be active.
    pub async fn active_connector(&self, connector_id: Uuid) -> DispatchResult<Connector> {
        let connector = self
            .store
            .get_connector(connector_id)
            .await?
            .ok_or(ConfigurationError::ConnectorNotFound(connector_id))?;
        if !connector.is_active() {
            return Err(ConfigurationError::ConnectorInactive(connector_id).into());
        }
        Ok(connector)
    }

    /// Send an ad-hoc call and record its outcome.
    pub async fn send(&self, request: SendRequest, caller: &Caller) -> DispatchResult<CallResult> {
        let connector = self.active_connector(request.connector_id).await?;
        let correlation_id = caller
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let spec = CallSpec {
            endpoint: request.endpoint,
            method: request.method,
            headers: request.headers,
            body: request.body,
            query_params: request.query_params,
        };
        let outcome = self.execute(&connector, &spec, &caller.user_id).await?;

        let record = CallRecord {
            id: Uuid::new_v4(),
            user_id: caller.user_id.clone(),
            connector_id: connector.id,
            correlation_id: correlation_id.clone(),
            method: spec.method,
            request_url: outcome.url.clone(),
            request_headers: sanitize_headers(&spec.headers),
            request_body: self.truncate_for_record(spec.body.as_deref()),
            status_code: outcome.status_code,
            response_headers: outcome.headers.clone(),
            response_body: self.truncate_for_record(outcome.body.as_deref()),
            duration_ms: outcome.duration_ms,
            is_success: outcome.is_success,
            error_message: outcome.error_message.clone(),
            retry_count: outcome.retry_count,
            created_at: Utc::now(),
        };
        let record_id = record.id;
        self.store.insert_call_record(record).await?;

        let mut dataset_id = None;
        if request.save_as_dataset && outcome.is_success {
            if let Some(body) = outcome.body.as_deref().filter(|b| !b.is_empty()) {
                let dataset = Dataset {
                    id: Uuid::new_v4(),
                    user_id: caller.user_id.clone(),
                    connector_id: connector.id,
                    call_record_id: record_id,
                    name: format!("Dataset_{}", record_id.simple()),
                    data: body.to_string(),
                    record_count: count_json_records(body),
                    created_at: Utc::now(),
                };
                dataset_id = Some(dataset.id);
                self.store.insert_dataset(dataset).await?;
            }
        }

        tracing::info!(
            correlation_id = %correlation_id,
            connector = %connector.name,
            method = %spec.method,
            status = outcome.status_code,
            duration_ms = outcome.duration_ms,
            retries = outcome.retry_count,
            success = outcome.is_success,
            "Call recorded"
        );

        self.publish_call_event(&connector, record_id, &correlation_id, &outcome);

        Ok(CallResult {
            record_id,
            correlation_id,
            status_code: outcome.status_code,
            headers: outcome.headers,
            body: outcome.body,
            duration_ms: outcome.duration_ms,
            is_success: outcome.is_success,
            error_message: outcome.error_message,
            retry_count: outcome.retry_count,
            dataset_id,
        })
    }

    /// Authenticate and send `spec` through the connector's pipeline.
    ///
    /// Does not check connector status and records nothing.
    pub async fn execute(&self, connector: &Connector, spec: &CallSpec, user_id: &str) -> DispatchResult<CallOutcome> {
        let url = build_url(&connector.base_url, &spec.endpoint, &spec.query_params);
        let mut outbound = OutboundRequest::new(spec.method, url.clone());

        let credentials = match self.store.get_secret(user_id, connector.id).await? {
            Some(secret) => Some(Credentials::unseal(self.vault.as_ref(), &secret)?),
            None => None,
        };
        match AuthStrategy::for_connector(connector).apply(credentials.as_ref(), &mut outbound) {
            AuthOutcome::Applied | AuthOutcome::NotRequired => {}
            AuthOutcome::MissingSecret => tracing::warn!(
                connector = %connector.name,
                user_id,
                auth_type = ?connector.auth_type,
                "No credentials for connector, sending unauthenticated"
            ),
            AuthOutcome::MissingParameterName => tracing::warn!(
                connector = %connector.name,
                auth_type = ?connector.auth_type,
                "Connector has no key parameter name configured, sending unauthenticated"
            ),
        }

        for (name, value) in &spec.headers {
            outbound.set_header(name.as_str(), value.as_str());
        }
        if spec.method.carries_body() {
            if let Some(body) = &spec.body {
                outbound.set_header("Content-Type", "application/json");
                outbound.body = Some(body.clone());
            }
        }

        let pipeline = self.pipelines.for_connector(connector);
        let policy = CallPolicy {
            max_retries: connector.max_retries,
            timeout: Duration::from_secs(connector.timeout_seconds),
        };

        let started = Instant::now();
        let result = pipeline.execute(self.transport.as_ref(), &outbound, policy).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result.result {
            Ok(response) => {
                let is_success = response.is_success();
                CallOutcome {
                    url,
                    status_code: response.status,
                    reason: response.reason,
                    headers: response.headers,
                    body: Some(response.body),
                    duration_ms,
                    is_success,
                    error_message: None,
                    retry_count: result.retry_count,
                }
            }
            Err(e) => {
                tracing::warn!(
                    connector = %connector.name,
                    pipeline = %pipeline.name(),
                    error = %e,
                    retries = result.retry_count,
                    "Outbound call failed"
                );
                CallOutcome {
                    url,
                    status_code: 0,
                    reason: None,
                    headers: BTreeMap::new(),
                    body: None,
                    duration_ms,
                    is_success: false,
                    error_message: Some(e.to_string()),
                    retry_count: result.retry_count,
                }
            }
        };

        metrics::record_call(pipeline.name(), outcome.status_code, outcome.is_success, started);
        Ok(outcome)
    }

    /// Register a connector at runtime under a fresh id. It shares the
    /// dynamic pipeline and never replaces an existing connector.
    pub async fn register_connector(&self, mut connector: Connector) -> DispatchResult<Connector> {
        validate_connector(&connector).map_err(|errors| {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ConfigurationError::InvalidConnector(reasons.join(", "))
        })?;
        connector.id = Uuid::new_v4();
        connector.dedicated_pipeline = false;
        self.store.upsert_connector(connector.clone()).await?;
        tracing::info!(connector_id = %connector.id, name = %connector.name, "Connector registered");

        if let Some(events) = self.events.clone() {
            let payload = json!({
                "connectorId": connector.id,
                "name": connector.name,
                "baseUrl": connector.base_url,
            });
            tokio::spawn(async move {
                events.publish(events::CONNECTOR_CREATED, payload).await;
            });
        }
        Ok(connector)
    }

    pub async fn list_connectors(&self) -> DispatchResult<Vec<Connector>> {
        Ok(self.store.list_connectors().await?)
    }

    /// Encrypt and store a caller's credentials for a connector, replacing
    /// any previous ones.
    pub async fn store_credentials(
        &self,
        user_id: &str,
        connector_id: Uuid,
        api_key: Option<&str>,
        token: Option<&str>,
    ) -> DispatchResult<()> {
        if self.store.get_connector(connector_id).await?.is_none() {
            return Err(ConfigurationError::ConnectorNotFound(connector_id).into());
        }
        let secret = UserSecret {
            user_id: user_id.to_string(),
            connector_id,
            encrypted_api_key: api_key.map(|k| self.vault.encrypt(k)).transpose()?,
            encrypted_token: token.map(|t| self.vault.encrypt(t)).transpose()?,
            expires_at: None,
        };
        self.store.put_secret(secret).await?;
        tracing::info!(user_id, connector_id = %connector_id, "Credentials stored");
        Ok(())
    }

    pub async fn list_call_records(&self, user_id: &str) -> DispatchResult<Vec<CallRecord>> {
        Ok(self.store.list_call_records(user_id).await?)
    }

    fn truncate_for_record(&self, body: Option<&str>) -> Option<String> {
        body.map(|b| truncate_chars(b, self.limits.max_body_chars, RECORD_TRUNCATION_MARKER))
    }

    fn publish_call_event(&self, connector: &Connector, record_id: Uuid, correlation_id: &str, outcome: &CallOutcome) {
        let Some(events) = self.events.clone() else {
            return;
        };
        let event = if outcome.is_success {
            events::API_REQUEST_COMPLETED
        } else {
            events::API_REQUEST_FAILED
        };
        let payload = json!({
            "recordId": record_id,
            "correlationId": correlation_id,
            "connectorId": connector.id,
            "connectorName": connector.name,
            "statusCode": outcome.status_code,
            "durationMs": outcome.duration_ms,
            "isSuccess": outcome.is_success,
            "errorMessage": outcome.error_message,
        });
        tokio::spawn(async move {
            events.publish(event, payload).await;
        });
    }
}
