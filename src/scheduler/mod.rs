//! Cron-recurring outbound calls.
//!
//! # Data Flow
//! ```text
//! create/update/toggle (service.rs)
//!     → cron.rs validates, computes next_run_at (UTC)
//!     → trigger.rs registers a timer keyed by job id
//!
//! timer fires (trigger.rs, at most one firing per job at a time)
//!     → Scheduler::fire
//!     → JobExecution(Running) → Dispatcher::execute → finalize
//!     → counters, last_run_*, next_run_at updated atomically
//! ```
//!
//! # Design Decisions
//! - The timer mechanism sits behind `TriggerSubstrate` so tests drive
//!   firings directly
//! - A firing never returns an error to the substrate
//! - `next_run_at` is recomputed from the completion time, and is `None`
//!   exactly when the job is disabled

pub mod clock;
pub mod cron;
pub mod service;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use service::{CreateJob, Scheduler, UpdateJob};
pub use trigger::{FireFn, TokioTriggerSubstrate, TriggerSubstrate};
