//! Filesystem artifact sink.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::application::repos::{ArtifactStore, RepoError};

const SOURCE: &str = "infra::artifacts";

/// Filesystem-backed artifact store rooted at a publish directory.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Initialise the store rooted at the provided directory, creating it
    /// if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve an object key inside the root, rejecting traversal.
    fn resolve(&self, key: &str) -> Result<PathBuf, RepoError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(RepoError::invalid_input(format!(
                "artifact key escapes the publish root: {key}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<(), RepoError> {
        let absolute = self.resolve(key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(RepoError::from_persistence)?;
        }
        fs::write(&absolute, &body)
            .await
            .map_err(RepoError::from_persistence)?;
        debug!(
            target: SOURCE,
            key,
            content_type,
            bytes = body.len(),
            "artifact written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_artifact_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf()).unwrap();

        store
            .put("front.html", "text/html", Bytes::from_static(b"<p>hi</p>"))
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("front.html")).unwrap();
        assert_eq!(written, "<p>hi</p>");
    }

    #[tokio::test]
    async fn creates_intermediate_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf()).unwrap();

        store
            .put("scripts/site.js", "text/javascript", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(dir.path().join("scripts/site.js").exists());
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf()).unwrap();

        let err = store
            .put("../escape.html", "text/html", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));

        let err = store
            .put("/absolute.html", "text/html", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
