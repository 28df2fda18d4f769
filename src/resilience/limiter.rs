//! Bounded concurrency with a bounded wait queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::PipelineError;

/// Admits up to `max_concurrency` calls at once and lets up to `queue_limit`
/// more wait. Anything beyond is rejected immediately.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    queued: AtomicUsize,
    queue_limit: usize,
}

/// Holds a queue position; released on drop, including on cancellation.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrency: usize, queue_limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            queued: AtomicUsize::new(0),
            queue_limit,
        }
    }

    /// Wait for an execution slot. The returned permit frees the slot on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, PipelineError> {
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Ok(permit);
        }

        let _slot = self.try_enqueue().ok_or(PipelineError::RateLimited)?;
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::RateLimited)
    }

    fn try_enqueue(&self) -> Option<QueueSlot<'_>> {
        let mut current = self.queued.load(Ordering::Acquire);
        loop {
            if current >= self.queue_limit {
                return None;
            }
            match self.queued.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(QueueSlot { queued: &self.queued }),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_concurrency
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}
