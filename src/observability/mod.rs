//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log stream
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Ids, status codes and durations are structured fields, never
//!   interpolated into messages
//! - Correlation id flows from the HTTP request id into call records
//! - Credentials are never handed to a logging macro

pub mod logging;
pub mod metrics;
