//! Circuit breaker over a sliding sampling window.
//!
//! # State Machine
//! ```text
//! Closed --(≥ min throughput and failure ratio ≥ threshold)--> Open
//! Open   --(break duration elapsed, next caller)-------------> HalfOpen
//! HalfOpen --(probe succeeds)--> Closed
//! HalfOpen --(probe fails)-----> Open
//! ```
//!
//! Only one probe is admitted while half-open. The window is split into
//! buckets so old samples age out without storing every outcome.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;

const WINDOW_BUCKETS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSettings {
    pub failure_ratio: f64,
    pub sampling_duration: Duration,
    pub minimum_throughput: u32,
    pub break_duration: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            sampling_duration: Duration::from_secs(30),
            minimum_throughput: 10,
            break_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

#[derive(Debug)]
struct Bucket {
    started: Instant,
    successes: u32,
    failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: State,
    window: VecDeque<Bucket>,
}

#[derive(Debug)]
struct Shared {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

/// Cloneable handle; clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

/// Permission to run one attempt. Report the outcome with `record`;
/// dropping it unrecorded (e.g. on cancellation) takes no sample.
#[derive(Debug)]
pub struct BreakerPermit {
    shared: Arc<Shared>,
    probe: bool,
    recorded: bool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                settings,
                inner: Mutex::new(Inner {
                    state: State::Closed,
                    window: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Ask to run an attempt. `None` means the circuit is open.
    pub fn try_acquire(&self) -> Option<BreakerPermit> {
        let now = Instant::now();
        let mut inner = self.shared.lock();

        let probe = match inner.state {
            State::Closed => false,
            State::Open { until } if now >= until => {
                inner.state = State::HalfOpen { probe_in_flight: true };
                tracing::info!(breaker = %self.shared.name, "Circuit half-open, admitting probe");
                metrics::record_breaker_state(&self.shared.name, CircuitState::HalfOpen);
                true
            }
            State::Open { .. } => return None,
            State::HalfOpen { probe_in_flight: false } => {
                inner.state = State::HalfOpen { probe_in_flight: true };
                true
            }
            State::HalfOpen { probe_in_flight: true } => return None,
        };

        Some(BreakerPermit {
            shared: self.shared.clone(),
            probe,
            recorded: false,
        })
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.shared.lock();
        match inner.state {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning only happens if a panic occurred mid-update; the state is
        // still a valid enum, so keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, probe: bool, failed: bool) {
        let now = Instant::now();
        let mut inner = self.lock();

        if probe {
            if failed {
                inner.state = State::Open { until: now + self.settings.break_duration };
                tracing::warn!(breaker = %self.name, "Probe failed, circuit re-opened");
                metrics::record_breaker_state(&self.name, CircuitState::Open);
            } else {
                inner.state = State::Closed;
                inner.window.clear();
                tracing::info!(breaker = %self.name, "Probe succeeded, circuit closed");
                metrics::record_breaker_state(&self.name, CircuitState::Closed);
            }
            return;
        }

        if !matches!(inner.state, State::Closed) {
            return;
        }

        self.add_sample(&mut inner, now, failed);

        let (successes, failures) = inner
            .window
            .iter()
            .fold((0u32, 0u32), |(s, f), b| (s + b.successes, f + b.failures));
        let total = successes + failures;
        if total >= self.settings.minimum_throughput
            && f64::from(failures) / f64::from(total) >= self.settings.failure_ratio
        {
            inner.state = State::Open { until: now + self.settings.break_duration };
            inner.window.clear();
            tracing::warn!(
                breaker = %self.name,
                failures,
                total,
                break_secs = self.settings.break_duration.as_secs(),
                "Circuit opened"
            );
            metrics::record_breaker_state(&self.name, CircuitState::Open);
        }
    }

    fn add_sample(&self, inner: &mut Inner, now: Instant, failed: bool) {
        let sampling = self.settings.sampling_duration;
        while let Some(front) = inner.window.front() {
            if now.duration_since(front.started) >= sampling {
                inner.window.pop_front();
            } else {
                break;
            }
        }

        let bucket_width = sampling / WINDOW_BUCKETS;
        let needs_bucket = match inner.window.back() {
            Some(b) => now.duration_since(b.started) >= bucket_width,
            None => true,
        };
        if needs_bucket {
            inner.window.push_back(Bucket {
                started: now,
                successes: 0,
                failures: 0,
            });
        }

        if let Some(bucket) = inner.window.back_mut() {
            if failed {
                bucket.failures += 1;
            } else {
                bucket.successes += 1;
            }
        }
    }
}

impl BreakerPermit {
    /// Report the attempt outcome as seen by the breaker.
    pub fn record(mut self, failed: bool) {
        self.recorded = true;
        self.shared.record(self.probe, failed);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.probe && !self.recorded {
            let mut inner = self.shared.lock();
            if let State::HalfOpen { probe_in_flight } = &mut inner.state {
                *probe_in_flight = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", BreakerSettings::default())
    }

    fn record_n(cb: &CircuitBreaker, n: u32, failed: bool) {
        for _ in 0..n {
            cb.try_acquire().expect("closed").record(failed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let cb = breaker();
        record_n(&cb, 5, false);
        record_n(&cb, 4, true);
        assert_eq!(cb.state(), CircuitState::Closed, "below minimum throughput");

        record_n(&cb, 1, true);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_ratio() {
        let cb = breaker();
        record_n(&cb, 6, false);
        record_n(&cb, 4, true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_samples_age_out() {
        let cb = breaker();
        record_n(&cb, 9, true);
        tokio::time::advance(Duration::from_secs(31)).await;
        record_n(&cb, 1, true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_single_probe() {
        let cb = breaker();
        record_n(&cb, 10, true);
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        let probe = cb.try_acquire().expect("probe admitted");
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_none(), "only one probe");

        probe.record(false);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let cb = breaker();
        record_n(&cb, 10, true);
        tokio::time::advance(Duration::from_secs(30)).await;

        cb.try_acquire().expect("probe").record(true);
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_releases_slot() {
        let cb = breaker();
        record_n(&cb, 10, true);
        tokio::time::advance(Duration::from_secs(30)).await;

        drop(cb.try_acquire().expect("probe"));
        assert!(cb.try_acquire().is_some(), "next caller may probe");
    }
}
