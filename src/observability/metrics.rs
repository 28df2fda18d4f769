//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_calls_total` (counter): dispatched calls by pipeline, outcome
//! - `dispatch_call_duration_seconds` (histogram): end-to-end call latency
//! - `pipeline_rejections_total` (counter): limiter / breaker rejections
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `scheduled_job_runs_total` (counter): job firings by status
//! - `webhook_deliveries_total` (counter): delivery attempts by event, outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is installed only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

pub fn record_call(pipeline: &str, status: u16, success: bool, start_time: Instant) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!(
        "dispatch_calls_total",
        "pipeline" => pipeline.to_string(),
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("dispatch_call_duration_seconds", "pipeline" => pipeline.to_string())
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_pipeline_rejection(pipeline: &str, reason: &'static str) {
    ::metrics::counter!(
        "pipeline_rejections_total",
        "pipeline" => pipeline.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_breaker_state(pipeline: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    ::metrics::gauge!("circuit_breaker_state", "pipeline" => pipeline.to_string()).set(value);
}

pub fn record_job_run(success: bool) {
    let status = if success { "success" } else { "failed" };
    ::metrics::counter!("scheduled_job_runs_total", "status" => status).increment(1);
}

pub fn record_webhook_delivery(event: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!(
        "webhook_deliveries_total",
        "event" => event.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
