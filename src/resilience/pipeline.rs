//! Composed resilience pipeline for one named target.

use std::time::Duration;

use super::circuit_breaker::{BreakerSettings, CircuitBreaker};
use super::limiter::ConcurrencyLimiter;
use super::retries::{is_breaker_failure, is_retryable, AttemptResult, RetryBackoff};
use super::timeouts::with_deadline;
use super::PipelineError;
use crate::observability::metrics;
use crate::transport::{OutboundRequest, Transport};

/// Shape of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub max_concurrency: usize,
    pub queue_limit: usize,
    pub backoff: RetryBackoff,
    pub breaker: BreakerSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 100,
            queue_limit: 50,
            backoff: RetryBackoff {
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
            },
            breaker: BreakerSettings::default(),
        }
    }
}

/// Per-call knobs, usually taken from the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Deadline for each attempt.
    pub timeout: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutcome {
    /// Last attempt's result.
    pub result: AttemptResult,
    /// Attempts made beyond the first.
    pub retry_count: u32,
}

/// limiter → retry → circuit breaker → timeout → transport.
#[derive(Debug)]
pub struct ResiliencePipeline {
    name: String,
    limiter: ConcurrencyLimiter,
    breaker: CircuitBreaker,
    backoff: RetryBackoff,
}

impl ResiliencePipeline {
    pub fn new(name: impl Into<String>, settings: PipelineSettings) -> Self {
        let name = name.into();
        Self {
            limiter: ConcurrencyLimiter::new(settings.max_concurrency, settings.queue_limit),
            breaker: CircuitBreaker::new(name.clone(), settings.breaker),
            backoff: settings.backoff,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Backoff before retry number `retry` (1-based) for callers that run
    /// their own retry loop.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        self.backoff.delay_for(retry)
    }

    /// Send `request` under every policy of this pipeline.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        request: &OutboundRequest,
        policy: CallPolicy,
    ) -> PipelineOutcome {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(pipeline = %self.name, url = %request.url, "Call rejected by concurrency limiter");
                metrics::record_pipeline_rejection(&self.name, "rate_limited");
                return PipelineOutcome { result: Err(e), retry_count: 0 };
            }
        };

        let mut retry_count = 0;
        loop {
            let result = self.attempt(transport, request, policy.timeout).await;

            if retry_count >= policy.max_retries || !is_retryable(&result) {
                return PipelineOutcome { result, retry_count };
            }

            retry_count += 1;
            let delay = self.backoff.delay_for(retry_count);
            tracing::debug!(
                pipeline = %self.name,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                outcome = %describe(&result),
                "Retrying outbound call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        transport: &dyn Transport,
        request: &OutboundRequest,
        timeout: Duration,
    ) -> AttemptResult {
        let Some(permit) = self.breaker.try_acquire() else {
            metrics::record_pipeline_rejection(&self.name, "circuit_open");
            return Err(PipelineError::CircuitOpen(self.name.clone()));
        };

        let result = with_deadline(timeout, transport.send(request)).await;
        permit.record(is_breaker_failure(&result));
        result
    }
}

fn describe(result: &AttemptResult) -> String {
    match result {
        Ok(response) => response.status.to_string(),
        Err(e) => e.to_string(),
    }
}
