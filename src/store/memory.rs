//! In-memory store backed by concurrent maps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    CallRecordStore, ConnectorStore, DatasetStore, DeliveryStore, ExecutionStore, JobStore,
    Mutation, SecretStore, StoreError, StoreResult, WebhookStore,
};
use crate::model::{
    CallRecord, Connector, Dataset, JobExecution, ScheduledJob, UserSecret, Webhook,
    WebhookDelivery,
};

#[derive(Default)]
struct Tables {
    connectors: DashMap<Uuid, Connector>,
    secrets: DashMap<(String, Uuid), UserSecret>,
    call_records: DashMap<Uuid, CallRecord>,
    datasets: DashMap<Uuid, Dataset>,
    jobs: DashMap<Uuid, ScheduledJob>,
    executions: DashMap<Uuid, JobExecution>,
    webhooks: DashMap<Uuid, Webhook>,
    deliveries: DashMap<Uuid, WebhookDelivery>,
    /// When set, every write fails with a backend error.
    fail_writes: AtomicBool,
}

/// Thread-safe, cloneable store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, for exercising persistence error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes are disabled".into()));
        }
        Ok(())
    }

    pub fn call_record_count(&self) -> usize {
        self.inner.call_records.len()
    }

    pub fn dataset_count(&self) -> usize {
        self.inner.datasets.len()
    }
}

fn insert_once<T>(map: &DashMap<Uuid, T>, id: Uuid, value: T) -> StoreResult<()> {
    match map.entry(id) {
        dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(id)),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}

fn update_in_place<T: Clone>(map: &DashMap<Uuid, T>, id: Uuid, mutation: Mutation<T>) -> StoreResult<T> {
    let mut entry = map.get_mut(&id).ok_or(StoreError::NotFound(id))?;
    mutation(entry.value_mut());
    Ok(entry.value().clone())
}

#[async_trait]
impl ConnectorStore for MemoryStore {
    async fn get_connector(&self, id: Uuid) -> StoreResult<Option<Connector>> {
        Ok(self.inner.connectors.get(&id).map(|r| r.value().clone()))
    }

    async fn list_connectors(&self) -> StoreResult<Vec<Connector>> {
        Ok(self.inner.connectors.iter().map(|r| r.value().clone()).collect())
    }

    async fn upsert_connector(&self, connector: Connector) -> StoreResult<()> {
        self.check_writable()?;
        self.inner.connectors.insert(connector.id, connector);
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get_secret(&self, user_id: &str, connector_id: Uuid) -> StoreResult<Option<UserSecret>> {
        Ok(self
            .inner
            .secrets
            .get(&(user_id.to_string(), connector_id))
            .map(|r| r.value().clone()))
    }

    async fn put_secret(&self, secret: UserSecret) -> StoreResult<()> {
        self.check_writable()?;
        self.inner
            .secrets
            .insert((secret.user_id.clone(), secret.connector_id), secret);
        Ok(())
    }
}

#[async_trait]
impl CallRecordStore for MemoryStore {
    async fn insert_call_record(&self, record: CallRecord) -> StoreResult<()> {
        self.check_writable()?;
        insert_once(&self.inner.call_records, record.id, record)
    }

    async fn get_call_record(&self, id: Uuid) -> StoreResult<Option<CallRecord>> {
        Ok(self.inner.call_records.get(&id).map(|r| r.value().clone()))
    }

    async fn list_call_records(&self, user_id: &str) -> StoreResult<Vec<CallRecord>> {
        let mut records: Vec<CallRecord> = self
            .inner
            .call_records
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn insert_dataset(&self, dataset: Dataset) -> StoreResult<()> {
        self.check_writable()?;
        insert_once(&self.inner.datasets, dataset.id, dataset)
    }

    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>> {
        Ok(self.inner.datasets.get(&id).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: ScheduledJob) -> StoreResult<()> {
        self.check_writable()?;
        insert_once(&self.inner.jobs, job.id, job)
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScheduledJob>> {
        Ok(self.inner.jobs.get(&id).map(|r| r.value().clone()))
    }

    async fn list_jobs(&self) -> StoreResult<Vec<ScheduledJob>> {
        Ok(self.inner.jobs.iter().map(|r| r.value().clone()).collect())
    }

    async fn update_job(&self, id: Uuid, mutation: Mutation<ScheduledJob>) -> StoreResult<ScheduledJob> {
        self.check_writable()?;
        update_in_place(&self.inner.jobs, id, mutation)
    }

    async fn delete_job(&self, id: Uuid) -> StoreResult<bool> {
        self.check_writable()?;
        Ok(self.inner.jobs.remove(&id).is_some())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_execution(&self, execution: JobExecution) -> StoreResult<()> {
        self.check_writable()?;
        insert_once(&self.inner.executions, execution.id, execution)
    }

    async fn update_execution(
        &self,
        id: Uuid,
        mutation: Mutation<JobExecution>,
    ) -> StoreResult<JobExecution> {
        self.check_writable()?;
        update_in_place(&self.inner.executions, id, mutation)
    }

    async fn list_executions(&self, job_id: Uuid) -> StoreResult<Vec<JobExecution>> {
        let mut executions: Vec<JobExecution> = self
            .inner
            .executions
            .iter()
            .filter(|r| r.scheduled_job_id == job_id)
            .map(|r| r.value().clone())
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn insert_webhook(&self, webhook: Webhook) -> StoreResult<()> {
        self.check_writable()?;
        insert_once(&self.inner.webhooks, webhook.id, webhook)
    }

    async fn get_webhook(&self, id: Uuid) -> StoreResult<Option<Webhook>> {
        Ok(self.inner.webhooks.get(&id).map(|r| r.value().clone()))
    }

    async fn list_webhooks(&self) -> StoreResult<Vec<Webhook>> {
        Ok(self.inner.webhooks.iter().map(|r| r.value().clone()).collect())
    }

    async fn update_webhook(&self, id: Uuid, mutation: Mutation<Webhook>) -> StoreResult<Webhook> {
        self.check_writable()?;
        update_in_place(&self.inner.webhooks, id, mutation)
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn insert_delivery(&self, delivery: WebhookDelivery) -> StoreResult<()> {
        self.check_writable()?;
        insert_once(&self.inner.deliveries, delivery.id, delivery)
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>> {
        Ok(self.inner.deliveries.get(&id).map(|r| r.value().clone()))
    }

    async fn list_deliveries(&self, webhook_id: Uuid) -> StoreResult<Vec<WebhookDelivery>> {
        let mut deliveries: Vec<WebhookDelivery> = self
            .inner
            .deliveries
            .iter()
            .filter(|r| r.webhook_id == webhook_id)
            .map(|r| r.value().clone())
            .collect();
        deliveries.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    use crate::model::{ExecutionStatus, HttpMethod};

    fn job() -> ScheduledJob {
        let now = Utc::now();
        ScheduledJob {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            connector_id: Uuid::new_v4(),
            name: "nightly".into(),
            endpoint: "/items".into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            query_params: BTreeMap::new(),
            cron_expression: "0 0 * * *".into(),
            is_enabled: true,
            last_run_at: None,
            next_run_at: None,
            last_run_status: None,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_concurrent_counter_updates_are_not_lost() {
        let store = MemoryStore::new();
        let job = job();
        let id = job.id;
        store.insert_job(job).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_job(id, Box::new(|j| j.success_count += 1))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stored = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(stored.success_count, 50);
    }

    #[tokio::test]
    async fn test_records_are_write_once() {
        let store = MemoryStore::new();
        let execution = JobExecution::start(Uuid::new_v4(), Utc::now());
        store.insert_execution(execution.clone()).await.unwrap();

        let err = store.insert_execution(execution).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_missing_entity() {
        let store = MemoryStore::new();
        let err = store
            .update_execution(Uuid::new_v4(), Box::new(|e| e.status = ExecutionStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.insert_job(job()).await,
            Err(StoreError::Backend(_))
        ));
    }
}
