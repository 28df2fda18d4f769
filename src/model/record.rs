//! Call records and dataset snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connector::HttpMethod;

/// Terminal record of one dispatched call, written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    pub user_id: String,
    pub connector_id: Uuid,
    pub correlation_id: String,
    pub method: HttpMethod,
    /// URL before authentication was applied; never carries query secrets.
    pub request_url: String,
    /// Header values with credential-like keys replaced by `[REDACTED]`.
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<String>,
    /// `0` when no HTTP response was received.
    pub status_code: u16,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: Option<String>,
    pub duration_ms: u64,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a successful response body kept for later analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub user_id: String,
    pub connector_id: Uuid,
    pub call_record_id: Uuid,
    pub name: String,
    pub data: String,
    pub record_count: usize,
    pub created_at: DateTime<Utc>,
}
