//! Per-attempt deadlines.

use std::future::Future;
use std::time::Duration;

use super::PipelineError;
use crate::transport::TransportError;

/// Run `attempt` under `deadline`. Expiry drops (cancels) the attempt.
pub async fn with_deadline<T, F>(deadline: Duration, attempt: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result.map_err(PipelineError::Transport),
        Err(_) => Err(PipelineError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let result: Result<(), _> = with_deadline(Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(PipelineError::Timeout(Duration::from_secs(2))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_attempt_passes_through() {
        let result = with_deadline(Duration::from_secs(2), async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
