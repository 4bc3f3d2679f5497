//! Artifact publishing.
//!
//! The combined script artifact is the one dependents read immediately after
//! a content change, so it is written synchronously. Every per-layout
//! artifact goes out as a fire-and-forget task: the caller never awaits
//! them and their failures are logged, not propagated.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::error::AppError;
use super::render::RenderBatch;
use super::repos::ArtifactStore;

const SOURCE: &str = "application::publish";

#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub async fn publish(&self, batch: &RenderBatch) -> Result<(), AppError> {
        if let Some(combined) = &batch.combined_script {
            self.store
                .put(&combined.key, &combined.content_type, combined.body.clone())
                .await?;
            debug!(
                target: SOURCE,
                key = combined.key,
                bytes = combined.body.len(),
                "combined script artifact written"
            );
        }

        for artifact in batch.artifacts.iter().cloned() {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                if let Err(err) = store
                    .put(&artifact.key, &artifact.content_type, artifact.body.clone())
                    .await
                {
                    counter!("vetrina_artifact_write_error_total").increment(1);
                    warn!(
                        target: SOURCE,
                        key = artifact.key,
                        error = %err,
                        "artifact write failed; not retried"
                    );
                }
            });
        }

        Ok(())
    }
}
