//! Errors surfaced by the dispatch façade.
//!
//! Transport-level failures never appear here: they are captured into the
//! call record and counted by the resilience policies. What callers see is
//! either a rejection before any network traffic (`Configuration`), a vault
//! failure, or a persistence failure.

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use crate::vault::VaultError;

/// Request rejected before any outbound call was made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("connector not found: {0}")]
    ConnectorNotFound(Uuid),

    #[error("connector inactive: {0}")]
    ConnectorInactive(Uuid),

    #[error("scheduled job not found: {0}")]
    JobNotFound(Uuid),

    #[error("webhook not found: {0}")]
    WebhookNotFound(Uuid),

    #[error("webhook delivery not found: {0}")]
    DeliveryNotFound(Uuid),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("invalid connector: {0}")]
    InvalidConnector(String),
}

/// Top-level error for dispatcher, scheduler and notifier operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl DispatchError {
    /// True when the request was rejected before touching the network.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DispatchError::Configuration(_))
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
