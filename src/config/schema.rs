//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the hub.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Connector;
use crate::resilience::circuit_breaker::BreakerSettings;
use crate::resilience::pipeline::PipelineSettings;
use crate::resilience::retries::RetryBackoff;

/// Root configuration for the dispatch hub.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// API listener settings.
    pub server: ServerConfig,

    /// Pipeline shape shared by every connector target.
    pub resilience: ResilienceConfig,

    /// Webhook delivery settings.
    pub webhooks: WebhookConfig,

    /// Cron scheduler settings.
    pub scheduler: SchedulerConfig,

    /// Secret encryption key source.
    pub vault: VaultConfig,

    /// Size caps for stored bodies.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Connectors declared up front. Each gets a dedicated pipeline.
    pub connectors: Vec<Connector>,
}

/// API listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Deadline for a whole API request, including all retries.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 300,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Limiter, retry and breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Calls allowed in flight per pipeline.
    pub max_concurrency: usize,

    /// Calls allowed to wait for a slot per pipeline.
    pub queue_limit: usize,

    /// First retry delay; doubles per retry.
    pub base_delay_ms: u64,

    /// Upper bound on a single retry delay.
    pub max_delay_ms: u64,

    /// Failure ratio that opens the breaker.
    pub failure_ratio: f64,

    /// Sliding window the ratio is computed over.
    pub sampling_duration_secs: u64,

    /// Samples required before the breaker may open.
    pub minimum_throughput: u32,

    /// How long the breaker stays open.
    pub break_duration_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 100,
            queue_limit: 50,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            failure_ratio: 0.5,
            sampling_duration_secs: 30,
            minimum_throughput: 10,
            break_duration_secs: 30,
        }
    }
}

impl ResilienceConfig {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_concurrency: self.max_concurrency,
            queue_limit: self.queue_limit,
            backoff: RetryBackoff {
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
            breaker: BreakerSettings {
                failure_ratio: self.failure_ratio,
                sampling_duration: Duration::from_secs(self.sampling_duration_secs),
                minimum_throughput: self.minimum_throughput,
                break_duration: Duration::from_secs(self.break_duration_secs),
            },
        }
    }
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Per-attempt deadline.
    pub timeout_secs: u64,

    /// Extra attempts for a triggered delivery after a retryable failure.
    /// Every attempt is recorded as its own delivery.
    pub max_retries: u32,

    /// Consecutive failures after which a webhook is disabled.
    pub failure_threshold: u32,

    /// User-Agent sent with every delivery.
    pub user_agent: String,

    /// Deliveries allowed in flight per webhook.
    pub max_concurrency: usize,

    /// Deliveries allowed to wait for a slot per webhook.
    pub queue_limit: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 0,
            failure_threshold: 10,
            user_agent: "ApiHub-Webhooks/1.0".to_string(),
            max_concurrency: 10,
            queue_limit: 20,
        }
    }
}

impl WebhookConfig {
    /// Delivery pipelines share backoff and breaker tuning with connectors
    /// but have their own concurrency bounds.
    pub fn pipeline_settings(&self, resilience: &ResilienceConfig) -> PipelineSettings {
        PipelineSettings {
            max_concurrency: self.max_concurrency,
            queue_limit: self.queue_limit,
            ..resilience.pipeline_settings()
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Register enabled jobs with the trigger substrate on startup.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Vault key configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Base64-encoded 32-byte key. Prefer `key_env` outside development.
    pub key: Option<String>,

    /// Environment variable holding the base64 key.
    pub key_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key: None,
            key_env: "HUB_VAULT_KEY".to_string(),
        }
    }
}

/// Stored body caps, in characters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Cap for call record request/response bodies.
    pub max_body_chars: usize,

    /// Cap for job execution response bodies.
    pub execution_body_chars: usize,

    /// Cap for the response body returned by a webhook test.
    pub test_response_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_chars: 50_000,
            execution_body_chars: 10_000,
            test_response_chars: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Expose Prometheus metrics.
    pub metrics_enabled: bool,

    /// Metrics listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "connector_dispatch=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: HubConfig = toml::from_str("").unwrap();
        assert_eq!(config.resilience.max_concurrency, 100);
        assert_eq!(config.resilience.queue_limit, 50);
        assert_eq!(config.webhooks.failure_threshold, 10);
        assert_eq!(config.limits.max_body_chars, 50_000);
        assert!(config.connectors.is_empty());
    }

    #[test]
    fn test_pipeline_settings_mapping() {
        let config: HubConfig = toml::from_str(
            r#"
            [resilience]
            base_delay_ms = 10
            break_duration_secs = 5
            "#,
        )
        .unwrap();

        let settings = config.resilience.pipeline_settings();
        assert_eq!(settings.backoff.base_delay, Duration::from_millis(10));
        assert_eq!(settings.breaker.break_duration, Duration::from_secs(5));
        assert_eq!(settings.breaker.minimum_throughput, 10);
    }
}
