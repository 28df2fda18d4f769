//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the vault key
//! - Seed connectors declared in configuration
//! - Wire store, transport, pipelines, dispatcher, notifier and scheduler
//! - Register enabled jobs with the trigger substrate
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The notifier is attached to the dispatcher as its event publisher, so
//!   every recorded call can fan out to webhooks

use std::sync::Arc;

use thiserror::Error;

use super::shutdown::Shutdown;
use crate::config::{HubConfig, VaultConfig};
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::resilience::PipelineRegistry;
use crate::scheduler::{Scheduler, SystemClock, TokioTriggerSubstrate};
use crate::store::{ConnectorStore, MemoryStore, StoreError};
use crate::transport::client::ReqwestTransport;
use crate::transport::TransportError;
use crate::vault::{AesGcmVault, VaultError};
use crate::webhook::WebhookNotifier;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("vault: {0}")]
    Vault(#[from] VaultError),

    #[error("http client: {0}")]
    Transport(#[from] TransportError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Fully wired engine components.
pub struct Engine {
    pub store: MemoryStore,
    pub pipelines: Arc<PipelineRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub notifier: Arc<WebhookNotifier>,
    pub scheduler: Arc<Scheduler>,
    pub shutdown: Shutdown,
}

impl Engine {
    pub async fn build(config: &HubConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let vault = Arc::new(resolve_vault(&config.vault)?);
        let transport = Arc::new(ReqwestTransport::new()?);
        let store = MemoryStore::new();

        for connector in &config.connectors {
            store.upsert_connector(connector.clone()).await?;
            tracing::info!(
                connector = %connector.name,
                base_url = %connector.base_url,
                auth_type = ?connector.auth_type,
                "Connector loaded"
            );
        }

        let pipelines = Arc::new(PipelineRegistry::with_webhook_settings(
            config.resilience.pipeline_settings(),
            config.webhooks.pipeline_settings(&config.resilience),
        ));

        let notifier = Arc::new(WebhookNotifier::new(
            Arc::new(store.clone()),
            transport.clone(),
            pipelines.clone(),
            config.webhooks.clone(),
            config.limits.test_response_chars,
        ));

        let dispatcher = Arc::new(
            Dispatcher::new(
                Arc::new(store.clone()),
                vault,
                transport,
                pipelines.clone(),
                config.limits.clone(),
            )
            .with_events(notifier.clone()),
        );

        let substrate = Arc::new(TokioTriggerSubstrate::new(Arc::new(SystemClock), shutdown.clone()));
        let scheduler = Scheduler::new(
            Arc::new(store.clone()),
            dispatcher.clone(),
            substrate,
            Arc::new(SystemClock),
            config.limits.clone(),
        );

        if config.scheduler.enabled {
            scheduler.register_all().await?;
        } else {
            tracing::warn!("Scheduler disabled, jobs will only run on demand");
        }

        Ok(Self {
            store,
            pipelines,
            dispatcher,
            notifier,
            scheduler,
            shutdown,
        })
    }
}

/// Key from configuration, then the environment, else a random key that
/// lives only as long as the process.
pub fn resolve_vault(config: &VaultConfig) -> Result<AesGcmVault, VaultError> {
    if let Some(key) = &config.key {
        return AesGcmVault::from_base64_key(key);
    }
    if let Ok(key) = std::env::var(&config.key_env) {
        return AesGcmVault::from_base64_key(key.trim());
    }
    tracing::warn!(
        key_env = %config.key_env,
        "No vault key configured, using an ephemeral key; stored secrets will not survive a restart"
    );
    Ok(AesGcmVault::new(AesGcmVault::generate_key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::Vault;
    use base64::Engine as _;

    #[test]
    fn test_configured_key_wins() {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let config = VaultConfig {
            key: Some(key.clone()),
            key_env: "CONNECTOR_DISPATCH_TEST_UNSET_KEY".into(),
        };

        let vault = resolve_vault(&config).unwrap();
        let sealed = vault.encrypt("hello").unwrap();

        let same = AesGcmVault::from_base64_key(&key).unwrap();
        assert_eq!(same.decrypt(&sealed).unwrap(), "hello");
    }

    #[test]
    fn test_bad_key_is_rejected() {
        let config = VaultConfig {
            key: Some("too-short".into()),
            key_env: "CONNECTOR_DISPATCH_TEST_UNSET_KEY".into(),
        };
        assert!(matches!(resolve_vault(&config), Err(VaultError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_build_seeds_declared_connectors() {
        let config = crate::config::loader::parse_config(
            r#"
            [vault]
            key_env = "CONNECTOR_DISPATCH_TEST_UNSET_KEY"

            [[connectors]]
            id = "0b7e4a52-51c1-4d8f-a1a4-3a6c2f0e9d11"
            name = "petstore"
            base_url = "https://petstore.test/v2"
            "#,
        )
        .unwrap();

        let engine = Engine::build(&config, Shutdown::new()).await.unwrap();
        let connectors = engine.dispatcher.list_connectors().await.unwrap();

        assert_eq!(connectors.len(), 1);
        assert!(connectors[0].dedicated_pipeline);
    }

    #[tokio::test]
    async fn test_webhook_pipelines_get_webhook_bounds() {
        let config = crate::config::loader::parse_config(
            r#"
            [vault]
            key_env = "CONNECTOR_DISPATCH_TEST_UNSET_KEY"

            [webhooks]
            max_concurrency = 3

            [[connectors]]
            id = "0b7e4a52-51c1-4d8f-a1a4-3a6c2f0e9d11"
            name = "petstore"
            base_url = "https://petstore.test/v2"
            "#,
        )
        .unwrap();

        let engine = Engine::build(&config, Shutdown::new()).await.unwrap();
        let connector = &engine.dispatcher.list_connectors().await.unwrap()[0];

        let hook = engine.pipelines.for_webhook(uuid::Uuid::new_v4());
        assert_eq!(hook.limiter().capacity(), 3);
        assert_eq!(engine.pipelines.for_connector(connector).limiter().capacity(), 100);
    }
}
