//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call to a named target:
//!     → limiter.rs (bounded concurrency + bounded queue, else RateLimited)
//!     → retries.rs (classify outcome, back off, try again)
//!         → circuit_breaker.rs (reject while open, sample every attempt)
//!             → timeouts.rs (per-attempt deadline)
//!                 → transport
//! ```
//!
//! # Design Decisions
//! - One pipeline per named target; limiter and breaker state is shared by
//!   every caller of that target (see registry.rs)
//! - The limiter wraps the whole retry loop, so a call holds one slot for
//!   all of its attempts
//! - Breaker rejections are not retried
//! - Timeout expiry is a transport failure for retry and breaker purposes
//! - All waiting is async and cancellable; dropping a call releases its
//!   limiter slot and any half-open probe it held

pub mod circuit_breaker;
pub mod limiter;
pub mod pipeline;
pub mod registry;
pub mod retries;
pub mod timeouts;

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use limiter::ConcurrencyLimiter;
pub use pipeline::{CallPolicy, PipelineOutcome, ResiliencePipeline};
pub use registry::PipelineRegistry;

/// Why a call produced no HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("rate limited: concurrency and queue limits reached")]
    RateLimited,

    #[error("circuit breaker is open for '{0}'")]
    CircuitOpen(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
