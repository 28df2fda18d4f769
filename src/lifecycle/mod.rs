//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Resolve vault key → Seed connectors → Wire components
//!     → Register enabled jobs
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop cron timers → Drain HTTP connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - In-flight job firings are not cancelled by shutdown; they finish or
//!   die with the runtime

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Engine, StartupError};
