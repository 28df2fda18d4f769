//! Event names and the publishing seam.

use async_trait::async_trait;
use serde_json::Value;

pub const API_REQUEST_COMPLETED: &str = "api.request.completed";
pub const API_REQUEST_FAILED: &str = "api.request.failed";
pub const CONNECTOR_CREATED: &str = "connector.created";
pub const CONNECTOR_UPDATED: &str = "connector.updated";
pub const CONNECTOR_DELETED: &str = "connector.deleted";
pub const USER_REGISTERED: &str = "user.registered";
pub const REPORT_GENERATED: &str = "report.generated";
pub const FILE_UPLOADED: &str = "file.uploaded";

/// Event name used by webhook test deliveries.
pub const TEST: &str = "test";

pub const ALL: [&str; 8] = [
    API_REQUEST_COMPLETED,
    API_REQUEST_FAILED,
    CONNECTOR_CREATED,
    CONNECTOR_UPDATED,
    CONNECTOR_DELETED,
    USER_REGISTERED,
    REPORT_GENERATED,
    FILE_UPLOADED,
];

/// Fire-and-forget sink for internal events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &str, data: Value);
}
