//! Retry policy: outcome classification and delay schedule.

use std::time::Duration;

use rand::Rng;

use super::PipelineError;
use crate::transport::TransportResponse;

/// Statuses worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Statuses the circuit breaker counts as failures. 408 and 429 are
/// retried but say nothing about upstream health.
pub const BREAKER_FAILURE_STATUSES: [u16; 4] = [500, 502, 503, 504];

pub type AttemptResult = Result<TransportResponse, PipelineError>;

pub fn is_retryable(outcome: &AttemptResult) -> bool {
    match outcome {
        Ok(response) => RETRYABLE_STATUSES.contains(&response.status),
        Err(PipelineError::Transport(_)) | Err(PipelineError::Timeout(_)) => true,
        Err(PipelineError::RateLimited) | Err(PipelineError::CircuitOpen(_)) => false,
    }
}

pub fn is_breaker_failure(outcome: &AttemptResult) -> bool {
    match outcome {
        Ok(response) => BREAKER_FAILURE_STATUSES.contains(&response.status),
        Err(PipelineError::Transport(_)) | Err(PipelineError::Timeout(_)) => true,
        Err(PipelineError::RateLimited) | Err(PipelineError::CircuitOpen(_)) => false,
    }
}

/// Largest share of a delay added as random jitter.
const JITTER_FRACTION: f64 = 0.2;

/// Exponential backoff: `base_delay × 2^(retry-1)` plus up to 20% jitter,
/// never longer than `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryBackoff {
    /// Delay before retry number `retry` (1-based). Zero for `retry == 0`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.delay_with_jitter(retry, rand::thread_rng().gen_range(0.0..=1.0))
    }

    /// `jitter` in `[0, 1]` scales the random share of the delay.
    fn delay_with_jitter(&self, retry: u32, jitter: f64) -> Duration {
        let Some(exponent) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        exponential
            .saturating_add(exponential.mul_f64(JITTER_FRACTION * jitter))
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::collections::BTreeMap;

    fn status(code: u16) -> AttemptResult {
        Ok(TransportResponse {
            status: code,
            reason: None,
            headers: BTreeMap::new(),
            body: String::new(),
        })
    }

    #[test]
    fn test_retry_classification() {
        for code in RETRYABLE_STATUSES {
            assert!(is_retryable(&status(code)), "{} should retry", code);
        }
        for code in [200, 201, 400, 401, 404, 501] {
            assert!(!is_retryable(&status(code)), "{} should not retry", code);
        }
        assert!(is_retryable(&Err(PipelineError::Transport(TransportError::Connect("refused".into())))));
        assert!(is_retryable(&Err(PipelineError::Timeout(Duration::from_secs(1)))));
        assert!(!is_retryable(&Err(PipelineError::CircuitOpen("x".into()))));
        assert!(!is_retryable(&Err(PipelineError::RateLimited)));
    }

    #[test]
    fn test_breaker_ignores_throttling() {
        assert!(!is_breaker_failure(&status(429)));
        assert!(!is_breaker_failure(&status(408)));
        assert!(is_breaker_failure(&status(503)));
        assert!(is_breaker_failure(&Err(PipelineError::Timeout(Duration::from_secs(1)))));
    }

    fn backoff() -> RetryBackoff {
        RetryBackoff {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_delay_doubles_per_retry() {
        let b = backoff();
        assert_eq!(b.delay_with_jitter(0, 1.0), Duration::ZERO);
        assert_eq!(b.delay_with_jitter(1, 0.0), Duration::from_secs(1));
        assert_eq!(b.delay_with_jitter(2, 0.0), Duration::from_secs(2));
        assert_eq!(b.delay_with_jitter(3, 0.0), Duration::from_secs(4));
        assert_eq!(b.delay_with_jitter(3, 1.0), Duration::from_millis(4800));
    }

    #[test]
    fn test_delay_never_exceeds_cap() {
        let b = backoff();
        assert_eq!(b.delay_with_jitter(5, 1.0), Duration::from_secs(19) + Duration::from_millis(200));
        assert_eq!(b.delay_with_jitter(6, 1.0), Duration::from_secs(30));
        assert_eq!(b.delay_with_jitter(40, 0.5), Duration::from_secs(30));
        for retry in 1..8 {
            let d = b.delay_for(retry);
            assert!(d >= b.delay_with_jitter(retry, 0.0) && d <= b.delay_with_jitter(retry, 1.0));
        }
    }
}
