//! Record-store hook boundary and pipeline wiring.
//!
//! The record store invokes the pipeline after each content item create,
//! update, or delete. Nothing that happens here may alter the outcome of
//! that primary operation, so the hook methods are infallible by contract:
//! internal failures are logged and dropped.

use std::sync::Arc;

use tracing::error;

use crate::cache::{CacheConfig, Clock, PipelineCaches};
use crate::domain::entities::ContentItem;

use super::classify::{ClassificationService, MutationKind};
use super::error::AppError;
use super::items::ItemCache;
use super::layouts::LayoutRegistry;
use super::publish::ArtifactPublisher;
use super::render::{RenderEngine, RenderResult};
use super::repos::{ArtifactStore, LayoutSource, MirrorRepo};

const SOURCE: &str = "application::hooks";

/// External collaborators and knobs the pipeline is wired from.
pub struct PipelineDeps {
    pub mirror: Arc<dyn MirrorRepo>,
    pub layouts: Arc<dyn LayoutSource>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub clock: Arc<dyn Clock>,
    pub cache_config: CacheConfig,
    /// Object key of the synchronously written combined script artifact.
    pub combined_script_file: String,
}

/// The assembled pipeline, one instance per process.
pub struct Pipeline {
    classifier: ClassificationService,
    renderer: RenderEngine,
    publisher: ArtifactPublisher,
    caches: Arc<PipelineCaches>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let caches = Arc::new(PipelineCaches::new(deps.cache_config, Arc::clone(&deps.clock)));
        let registry = LayoutRegistry::new(deps.layouts, Arc::clone(&caches));
        let items = ItemCache::new(Arc::clone(&deps.mirror), Arc::clone(&caches));
        Self {
            classifier: ClassificationService::new(
                deps.mirror,
                registry.clone(),
                Arc::clone(&deps.clock),
            ),
            renderer: RenderEngine::new(registry, items, deps.combined_script_file),
            publisher: ArtifactPublisher::new(deps.artifacts),
            caches,
        }
    }

    pub async fn after_create(&self, item: &ContentItem) {
        self.mutated(item, MutationKind::Create).await;
    }

    pub async fn after_update(&self, item: &ContentItem) {
        self.mutated(item, MutationKind::Update).await;
    }

    pub async fn after_delete(&self, item: &ContentItem) {
        self.mutated(item, MutationKind::Delete).await;
    }

    async fn mutated(&self, item: &ContentItem, op: MutationKind) {
        self.classifier.apply(item, op).await;
        if let Err(err) = self.render_and_publish().await {
            error!(
                target: SOURCE,
                item_id = item.id,
                error = %err,
                "render pass failed; content operation unaffected"
            );
        }
    }

    /// On-demand render of every active layout, publishing the artifacts.
    pub async fn render_and_publish(&self) -> Result<Vec<RenderResult>, AppError> {
        let batch = self.renderer.render_all().await?;
        self.publisher.publish(&batch).await?;
        Ok(batch.results)
    }

    /// Direct access to the classifier, for callers that need outcomes.
    pub fn classifier(&self) -> &ClassificationService {
        &self.classifier
    }

    /// Admin cache-bust: force every cache back to its source.
    pub fn flush_caches(&self) {
        self.caches.clear_all();
    }
}
