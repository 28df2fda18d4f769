//! Webhook notification subsystem.
//!
//! # Data Flow
//! ```text
//! trigger(event, data)
//!     → select enabled webhooks whose event list contains `event`
//!     → envelope {event, timestamp, data} serialized once
//!     → signing.rs (sha256=HMAC(payload, webhook.secret))
//!     → per-webhook resilience pipeline → POST webhook.url
//!     → WebhookDelivery recorded, webhook bookkeeping updated
//! ```
//!
//! # Design Decisions
//! - Deliveries to different webhooks run concurrently
//! - `failure_count` counts consecutive failures; reaching the threshold
//!   disables the webhook permanently (manual re-enable only)
//! - Test deliveries are recorded but never touch failure accounting

pub mod events;
pub mod notifier;
pub mod signing;

pub use events::EventPublisher;
pub use notifier::{RegisterWebhook, WebhookNotifier, WebhookTestResult};
