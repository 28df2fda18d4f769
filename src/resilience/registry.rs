//! Keyed pipeline instances.
//!
//! Pipelines are created lazily and live for the life of the registry, so
//! limiter and breaker state is shared by every caller of the same target.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::pipeline::{PipelineSettings, ResiliencePipeline};
use crate::model::Connector;

/// Name of the pipeline shared by connectors registered at runtime.
pub const DYNAMIC_PIPELINE: &str = "dynamic";

/// Prefix of per-webhook delivery pipelines.
pub const WEBHOOK_PIPELINE_PREFIX: &str = "webhook";

pub struct PipelineRegistry {
    settings: PipelineSettings,
    webhook_settings: PipelineSettings,
    pipelines: DashMap<String, Arc<ResiliencePipeline>>,
}

impl PipelineRegistry {
    pub fn new(settings: PipelineSettings) -> Self {
        Self::with_webhook_settings(settings, settings)
    }

    pub fn with_webhook_settings(settings: PipelineSettings, webhook_settings: PipelineSettings) -> Self {
        Self {
            settings,
            webhook_settings,
            pipelines: DashMap::new(),
        }
    }

    /// Pipeline for a connector: its own when declared in configuration,
    /// the shared dynamic one otherwise.
    pub fn for_connector(&self, connector: &Connector) -> Arc<ResiliencePipeline> {
        if connector.dedicated_pipeline {
            self.get_or_create(&format!("connector:{}", connector.name), self.settings)
        } else {
            self.get_or_create(DYNAMIC_PIPELINE, self.settings)
        }
    }

    /// Delivery pipeline for one webhook. Breaker state is per subscriber.
    pub fn for_webhook(&self, webhook_id: Uuid) -> Arc<ResiliencePipeline> {
        self.get_or_create(
            &format!("{}:{}", WEBHOOK_PIPELINE_PREFIX, webhook_id),
            self.webhook_settings,
        )
    }

    fn get_or_create(&self, name: &str, settings: PipelineSettings) -> Arc<ResiliencePipeline> {
        if let Some(existing) = self.pipelines.get(name) {
            return existing.clone();
        }
        self.pipelines
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(pipeline = name, "Creating resilience pipeline");
                Arc::new(ResiliencePipeline::new(name, settings))
            })
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Every live pipeline, by name.
    pub fn all(&self) -> Vec<Arc<ResiliencePipeline>> {
        let mut pipelines: Vec<Arc<ResiliencePipeline>> = self.pipelines.iter().map(|r| r.value().clone()).collect();
        pipelines.sort_by(|a, b| a.name().cmp(b.name()));
        pipelines
    }

    /// Drop every pipeline; the next call starts with fresh limiter and
    /// breaker state.
    pub fn reset(&self) {
        self.pipelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedicated_and_shared_pipelines() {
        let registry = PipelineRegistry::new(PipelineSettings::default());

        let mut weather = Connector::new("weather", "https://weather.test");
        weather.dedicated_pipeline = true;
        let ad_hoc_a = Connector::new("a", "https://a.test");
        let ad_hoc_b = Connector::new("b", "https://b.test");

        let p1 = registry.for_connector(&weather);
        let p2 = registry.for_connector(&weather);
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(p1.name(), "connector:weather");

        let shared_a = registry.for_connector(&ad_hoc_a);
        let shared_b = registry.for_connector(&ad_hoc_b);
        assert!(Arc::ptr_eq(&shared_a, &shared_b));

        let hook = Uuid::nil();
        registry.for_webhook(hook);
        assert_eq!(
            registry.names(),
            vec![
                "connector:weather".to_string(),
                "dynamic".to_string(),
                format!("webhook:{}", hook),
            ]
        );
    }

    #[test]
    fn test_reset_creates_fresh_instances() {
        let registry = PipelineRegistry::new(PipelineSettings::default());
        let before = registry.for_webhook(Uuid::nil());
        registry.reset();
        let after = registry.for_webhook(Uuid::nil());
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_webhook_pipelines_use_their_own_settings() {
        let mut webhook_settings = PipelineSettings::default();
        webhook_settings.max_concurrency = 4;
        let registry = PipelineRegistry::with_webhook_settings(PipelineSettings::default(), webhook_settings);

        let hook = registry.for_webhook(Uuid::new_v4());
        let other = registry.for_webhook(Uuid::new_v4());
        let connector = registry.for_connector(&Connector::new("a", "https://a.test"));

        assert!(!Arc::ptr_eq(&hook, &other));
        assert_eq!(hook.limiter().capacity(), 4);
        assert_eq!(connector.limiter().capacity(), 100);
        assert_eq!(registry.all().len(), 3);
    }
}
