//! Domain entities shared by the dispatcher, scheduler and webhook notifier.
//!
//! # Data Flow
//! ```text
//! Connector + UserSecret (read-only inputs)
//!     → dispatch → CallRecord (+ optional Dataset)
//! ScheduledJob
//!     → scheduler → JobExecution (Running → Success | Failed)
//! Webhook
//!     → notifier → WebhookDelivery (one per attempt)
//! ```
//!
//! # Design Decisions
//! - All entities are plain serde structs; storage is behind `store` traits
//! - Records are write-once; the core never deletes them
//! - Timestamps are UTC

pub mod connector;
pub mod job;
pub mod record;
pub mod webhook;

pub use connector::{AuthType, Connector, ConnectorStatus, HttpMethod, UserSecret};
pub use job::{ExecutionStatus, JobExecution, ScheduledJob};
pub use record::{CallRecord, Dataset};
pub use webhook::{Webhook, WebhookDelivery};
