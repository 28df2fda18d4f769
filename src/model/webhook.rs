//! Webhook subscriptions and delivery attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An outbound subscription to internal events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub url: String,
    /// HMAC signing key.
    pub secret: String,
    /// Comma-separated event names, e.g. `api.request.completed,file.uploaded`.
    pub events: String,
    pub is_enabled: bool,
    pub failure_count: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// `"<code> <reason>"` or `"Error: <message>"`.
    pub last_response_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Substring match against the stored event list.
    ///
    /// `api.request` therefore matches a webhook subscribed to
    /// `api.request.completed`. Kept for compatibility with stored
    /// subscriptions.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.contains(event)
    }
}

/// One delivery attempt, written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event: String,
    /// Exact JSON body that was signed and sent.
    pub payload: String,
    /// JSON object of the signature headers sent with the attempt.
    pub request_headers: String,
    pub response_status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub is_success: bool,
    pub attempt_number: u32,
    pub duration_ms: u64,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
