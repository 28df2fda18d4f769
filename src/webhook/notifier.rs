//! Signed webhook delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::events::{self, EventPublisher};
use super::signing::sign;
use crate::config::WebhookConfig;
use crate::dispatch::request::truncate_chars;
use crate::error::{ConfigurationError, DispatchResult};
use crate::model::{HttpMethod, Webhook, WebhookDelivery};
use crate::observability::metrics;
use crate::resilience::retries::is_retryable;
use crate::resilience::{CallPolicy, PipelineRegistry, ResiliencePipeline};
use crate::store::{DeliveryStore, WebhookRepository, WebhookStore};
use crate::transport::{OutboundRequest, Transport};

pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";
pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_WEBHOOK_ID: &str = "X-Webhook-Id";
pub const HEADER_DELIVERY_ID: &str = "X-Webhook-Delivery-Id";

const TEST_MESSAGE: &str = "This is a test webhook delivery from ApiHub.";

/// Whether a delivery feeds the webhook's failure accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accounting {
    Track,
    Skip,
}

struct Attempt {
    delivery: WebhookDelivery,
    retryable: bool,
    still_enabled: bool,
}

/// Summary returned by `test`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTestResult {
    pub delivery_id: Uuid,
    pub is_success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

/// New subscription. A signing secret is generated when none is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebhook {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

pub struct WebhookNotifier {
    store: Arc<dyn WebhookRepository>,
    transport: Arc<dyn Transport>,
    pipelines: Arc<PipelineRegistry>,
    config: WebhookConfig,
    test_response_chars: usize,
}

impl WebhookNotifier {
    pub fn new(
        store: Arc<dyn WebhookRepository>,
        transport: Arc<dyn Transport>,
        pipelines: Arc<PipelineRegistry>,
        config: WebhookConfig,
        test_response_chars: usize,
    ) -> Self {
        Self {
            store,
            transport,
            pipelines,
            config,
            test_response_chars,
        }
    }

    pub async fn register(&self, owner: &str, request: RegisterWebhook) -> DispatchResult<Webhook> {
        for event in &request.events {
            if !events::ALL.contains(&event.as_str()) {
                tracing::warn!(event = %event, "Webhook subscribes to an unknown event");
            }
        }
        let secret = request.secret.unwrap_or_else(generate_secret);
        let webhook = Webhook {
            id: Uuid::new_v4(),
            user_id: owner.to_string(),
            name: request.name,
            url: request.url,
            secret,
            events: request.events.join(","),
            is_enabled: true,
            failure_count: 0,
            last_triggered_at: None,
            last_response_status: None,
            created_at: Utc::now(),
        };
        self.store.insert_webhook(webhook.clone()).await?;
        tracing::info!(webhook_id = %webhook.id, url = %webhook.url, events = %webhook.events, "Webhook registered");
        Ok(webhook)
    }

    pub async fn list_webhooks(&self, owner: &str) -> DispatchResult<Vec<Webhook>> {
        let webhooks = self.store.list_webhooks().await?;
        Ok(webhooks.into_iter().filter(|w| w.user_id == owner).collect())
    }

    pub async fn list_deliveries(&self, webhook_id: Uuid) -> DispatchResult<Vec<WebhookDelivery>> {
        if self.store.get_webhook(webhook_id).await?.is_none() {
            return Err(ConfigurationError::WebhookNotFound(webhook_id).into());
        }
        Ok(self.store.list_deliveries(webhook_id).await?)
    }

    /// Deliver `data` to every enabled webhook subscribed to `event`.
    ///
    /// Deliveries run concurrently; one delivery record is written per
    /// webhook.
    pub async fn trigger(&self, event: &str, data: Value) -> DispatchResult<Vec<WebhookDelivery>> {
        let targets: Vec<Webhook> = self
            .store
            .list_webhooks()
            .await?
            .into_iter()
            .filter(|w| w.is_enabled && w.subscribes_to(event))
            .collect();

        if targets.is_empty() {
            tracing::debug!(event, "No webhooks registered for event");
            return Ok(Vec::new());
        }

        let payload = json!({
            "event": event,
            "timestamp": Utc::now(),
            "data": data,
        })
        .to_string();

        let results = join_all(
            targets
                .iter()
                .map(|webhook| self.deliver(webhook, event, &payload, self.config.max_retries)),
        )
        .await;

        results.into_iter().collect()
    }

    /// Re-send a stored delivery's payload as the next attempt.
    pub async fn retry_delivery(&self, delivery_id: Uuid) -> DispatchResult<WebhookDelivery> {
        let previous = self
            .store
            .get_delivery(delivery_id)
            .await?
            .ok_or(ConfigurationError::DeliveryNotFound(delivery_id))?;
        let webhook = self
            .store
            .get_webhook(previous.webhook_id)
            .await?
            .ok_or(ConfigurationError::WebhookNotFound(previous.webhook_id))?;

        tracing::info!(
            webhook_id = %webhook.id,
            delivery_id = %delivery_id,
            attempt = previous.attempt_number + 1,
            "Retrying webhook delivery"
        );
        let pipeline = self.pipelines.for_webhook(webhook.id);
        let attempt = self
            .attempt(
                &pipeline,
                &webhook,
                &previous.event,
                &previous.payload,
                previous.attempt_number + 1,
                Accounting::Track,
            )
            .await?;
        Ok(attempt.delivery)
    }

    /// Send a synthetic `test` event. Records a delivery but leaves the
    /// webhook's failure count and enabled flag untouched.
    pub async fn test(&self, webhook_id: Uuid) -> DispatchResult<WebhookTestResult> {
        let webhook = self
            .store
            .get_webhook(webhook_id)
            .await?
            .ok_or(ConfigurationError::WebhookNotFound(webhook_id))?;

        let payload = json!({
            "event": events::TEST,
            "timestamp": Utc::now(),
            "data": {
                "webhookId": webhook.id,
                "message": TEST_MESSAGE,
            },
        })
        .to_string();

        let pipeline = self.pipelines.for_webhook(webhook.id);
        let delivery = self
            .attempt(&pipeline, &webhook, events::TEST, &payload, 1, Accounting::Skip)
            .await?
            .delivery;

        Ok(WebhookTestResult {
            delivery_id: delivery.id,
            is_success: delivery.is_success,
            status_code: delivery.response_status_code,
            response_body: delivery
                .response_body
                .as_deref()
                .map(|b| truncate_chars(b, self.test_response_chars, "...")),
            error_message: delivery.error_message,
            duration_ms: delivery.duration_ms,
        })
    }

    /// Deliver `payload` to one webhook. Every HTTP attempt is recorded as
    /// its own delivery; retryable failures are attempted again up to
    /// `max_retries` times while the webhook stays enabled.
    async fn deliver(
        &self,
        webhook: &Webhook,
        event: &str,
        payload: &str,
        max_retries: u32,
    ) -> DispatchResult<WebhookDelivery> {
        let pipeline = self.pipelines.for_webhook(webhook.id);
        let mut retries = 0;
        loop {
            let attempt = self
                .attempt(&pipeline, webhook, event, payload, retries + 1, Accounting::Track)
                .await?;
            if attempt.delivery.is_success
                || !attempt.retryable
                || !attempt.still_enabled
                || retries >= max_retries
            {
                return Ok(attempt.delivery);
            }

            retries += 1;
            let delay = pipeline.retry_delay(retries);
            tracing::debug!(
                webhook_id = %webhook.id,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying webhook delivery"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One HTTP attempt through the webhook's pipeline, recorded as a
    /// delivery.
    async fn attempt(
        &self,
        pipeline: &ResiliencePipeline,
        webhook: &Webhook,
        event: &str,
        payload: &str,
        attempt_number: u32,
        accounting: Accounting,
    ) -> DispatchResult<Attempt> {
        let delivery_id = Uuid::new_v4();
        let signature = sign(payload, &webhook.secret);
        let triggered_at = Utc::now();

        let mut request = OutboundRequest::new(HttpMethod::Post, webhook.url.clone());
        request.set_header(HEADER_SIGNATURE, signature.as_str());
        request.set_header(HEADER_EVENT, event);
        request.set_header(HEADER_WEBHOOK_ID, webhook.id.to_string());
        request.set_header(HEADER_DELIVERY_ID, delivery_id.to_string());
        request.set_header("User-Agent", self.config.user_agent.as_str());
        request.set_header("Content-Type", "application/json");
        request.body = Some(payload.to_string());

        let request_headers = json!({
            HEADER_SIGNATURE: signature,
            HEADER_EVENT: event,
            HEADER_WEBHOOK_ID: webhook.id.to_string(),
            HEADER_DELIVERY_ID: delivery_id.to_string(),
        })
        .to_string();

        let policy = CallPolicy {
            max_retries: 0,
            timeout: Duration::from_secs(self.config.timeout_secs),
        };
        let started = Instant::now();
        let outcome = pipeline.execute(self.transport.as_ref(), &request, policy).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let retryable = is_retryable(&outcome.result);

        let (status_code, response_body, error_message, is_success, status_line) = match outcome.result {
            Ok(response) => {
                let ok = response.is_success();
                let line = response.status_line();
                (Some(response.status), Some(response.body), None, ok, line)
            }
            Err(e) => {
                let message = e.to_string();
                let line = format!("Error: {}", message);
                (None, None, Some(message), false, line)
            }
        };

        let delivery = WebhookDelivery {
            id: delivery_id,
            webhook_id: webhook.id,
            event: event.to_string(),
            payload: payload.to_string(),
            request_headers,
            response_status_code: status_code,
            response_body,
            error_message,
            is_success,
            attempt_number,
            duration_ms,
            triggered_at,
            completed_at: Some(Utc::now()),
        };
        self.store.insert_delivery(delivery.clone()).await?;
        metrics::record_webhook_delivery(event, is_success);

        let still_enabled = match accounting {
            Accounting::Track => self.apply_result(webhook.id, is_success, status_line).await?,
            Accounting::Skip => true,
        };

        if is_success {
            tracing::debug!(webhook_id = %webhook.id, event, status = ?status_code, "Webhook delivered");
        } else {
            tracing::warn!(
                webhook_id = %webhook.id,
                event,
                status = ?status_code,
                error = ?delivery.error_message,
                attempt = attempt_number,
                "Webhook delivery failed"
            );
        }
        Ok(Attempt {
            delivery,
            retryable,
            still_enabled,
        })
    }

    /// Atomic update of the webhook's delivery bookkeeping.
    /// Returns whether the webhook is still enabled afterwards.
    async fn apply_result(&self, webhook_id: Uuid, success: bool, status_line: String) -> DispatchResult<bool> {
        let threshold = self.config.failure_threshold;
        let now = Utc::now();
        let updated = self
            .store
            .update_webhook(
                webhook_id,
                Box::new(move |w| {
                    w.last_triggered_at = Some(now);
                    w.last_response_status = Some(status_line);
                    if success {
                        w.failure_count = 0;
                    } else {
                        w.failure_count += 1;
                        if w.failure_count >= threshold {
                            w.is_enabled = false;
                        }
                    }
                }),
            )
            .await?;

        if !success && !updated.is_enabled && updated.failure_count == threshold {
            tracing::warn!(
                webhook_id = %webhook_id,
                failure_count = updated.failure_count,
                "Webhook disabled after consecutive failures"
            );
        }
        Ok(updated.is_enabled)
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl EventPublisher for WebhookNotifier {
    async fn publish(&self, event: &str, data: Value) {
        if let Err(e) = self.trigger(event, data).await {
            tracing::error!(event, error = %e, "Failed to publish webhook event");
        }
    }
}
