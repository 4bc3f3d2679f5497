//! Layout document loader.
//!
//! Layouts live in one externally edited JSON document; the whole document
//! is fetched in a single read, matching the one-object-get shape of the
//! [`LayoutSource`] seam.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::application::repos::{LayoutSource, RepoError};
use crate::domain::layouts::LayoutRecord;

/// Layout source backed by a JSON file on disk.
#[derive(Debug)]
pub struct FsLayoutSource {
    path: PathBuf,
}

impl FsLayoutSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl LayoutSource for FsLayoutSource {
    async fn fetch(&self) -> Result<Option<Vec<LayoutRecord>>, RepoError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RepoError::from_persistence(err)),
        };

        let records: Vec<LayoutRecord> = serde_json::from_slice(&raw).map_err(|err| {
            RepoError::invalid_input(format!("layout document is not valid JSON: {err}"))
        })?;
        Ok(Some(records))
    }
}
