//! Persistence collaborators.
//!
//! # Responsibilities
//! - Define the read/write interfaces the engine consumes
//! - Provide atomic read-modify-write for per-entity completion updates
//! - Ship an in-memory implementation for the service binary and tests
//!
//! # Design Decisions
//! - One trait per entity family; components depend on the narrow bundle
//!   they need (`DispatchStore`, `JobRepository`, `WebhookRepository`)
//! - Updates take a closure applied while the entity is locked, so counter
//!   increments from concurrent completions are never lost
//! - Call records, executions and deliveries are write-once from the
//!   engine's point of view; executions are finalized through `update`

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    CallRecord, Connector, Dataset, JobExecution, ScheduledJob, UserSecret, Webhook,
    WebhookDelivery,
};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("record already exists: {0}")]
    Duplicate(Uuid),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// In-place mutation applied atomically to a stored entity.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Read model for connectors.
#[async_trait]
pub trait ConnectorStore: Send + Sync {
    async fn get_connector(&self, id: Uuid) -> StoreResult<Option<Connector>>;
    async fn list_connectors(&self) -> StoreResult<Vec<Connector>>;
    async fn upsert_connector(&self, connector: Connector) -> StoreResult<()>;
}

/// Encrypted per-user credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, user_id: &str, connector_id: Uuid) -> StoreResult<Option<UserSecret>>;
    async fn put_secret(&self, secret: UserSecret) -> StoreResult<()>;
}

#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn insert_call_record(&self, record: CallRecord) -> StoreResult<()>;
    async fn get_call_record(&self, id: Uuid) -> StoreResult<Option<CallRecord>>;
    async fn list_call_records(&self, user_id: &str) -> StoreResult<Vec<CallRecord>>;
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn insert_dataset(&self, dataset: Dataset) -> StoreResult<()>;
    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: ScheduledJob) -> StoreResult<()>;
    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScheduledJob>>;
    async fn list_jobs(&self) -> StoreResult<Vec<ScheduledJob>>;
    /// Apply `mutation` atomically and return the updated job.
    async fn update_job(&self, id: Uuid, mutation: Mutation<ScheduledJob>) -> StoreResult<ScheduledJob>;
    /// Returns `false` when the job did not exist.
    async fn delete_job(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: JobExecution) -> StoreResult<()>;
    async fn update_execution(
        &self,
        id: Uuid,
        mutation: Mutation<JobExecution>,
    ) -> StoreResult<JobExecution>;
    /// Executions for a job, most recent first.
    async fn list_executions(&self, job_id: Uuid) -> StoreResult<Vec<JobExecution>>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert_webhook(&self, webhook: Webhook) -> StoreResult<()>;
    async fn get_webhook(&self, id: Uuid) -> StoreResult<Option<Webhook>>;
    async fn list_webhooks(&self) -> StoreResult<Vec<Webhook>>;
    async fn update_webhook(&self, id: Uuid, mutation: Mutation<Webhook>) -> StoreResult<Webhook>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert_delivery(&self, delivery: WebhookDelivery) -> StoreResult<()>;
    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>>;
    /// Deliveries for a webhook, most recent first.
    async fn list_deliveries(&self, webhook_id: Uuid) -> StoreResult<Vec<WebhookDelivery>>;
}

/// Everything the dispatcher reads and writes.
pub trait DispatchStore: ConnectorStore + SecretStore + CallRecordStore + DatasetStore {}
impl<T> DispatchStore for T where T: ConnectorStore + SecretStore + CallRecordStore + DatasetStore {}

/// Everything the scheduler reads and writes.
pub trait JobRepository: JobStore + ExecutionStore + ConnectorStore {}
impl<T> JobRepository for T where T: JobStore + ExecutionStore + ConnectorStore {}

/// Everything the webhook notifier reads and writes.
pub trait WebhookRepository: WebhookStore + DeliveryStore {}
impl<T> WebhookRepository for T where T: WebhookStore + DeliveryStore {}
