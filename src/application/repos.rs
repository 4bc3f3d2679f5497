//! Persistence and sink seams the pipeline is built against.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{Flag, FlagSet, MirrorRecord};
use crate::domain::layouts::LayoutRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("storage timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// The denormalized mirror table behind the classification and render paths.
#[async_trait]
pub trait MirrorRepo: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<MirrorRecord>, RepoError>;

    /// Full table scan; amortized by the item cache, one call per TTL window.
    async fn scan(&self) -> Result<Vec<MirrorRecord>, RepoError>;

    async fn insert(&self, record: &MirrorRecord) -> Result<(), RepoError>;

    /// Update only the flag columns and the modification timestamp;
    /// descriptive fields are left untouched.
    async fn update_flags(
        &self,
        id: i64,
        flags: FlagSet,
        modified_at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Delete the row for an item; absent rows are not an error.
    async fn delete(&self, id: i64) -> Result<(), RepoError>;

    /// Member counts for every requested flag in one aggregate statement,
    /// excluding `exclude_id` so an item never counts itself.
    async fn count_members(
        &self,
        flags: &[Flag],
        exclude_id: i64,
    ) -> Result<BTreeMap<Flag, u64>, RepoError>;

    /// Single-flag count; the sequential fallback when the batch fails.
    async fn count_flag(&self, flag: Flag, exclude_id: i64) -> Result<u64, RepoError>;
}

/// The external layout document, fetched as one key/object get.
#[async_trait]
pub trait LayoutSource: Send + Sync {
    /// `Ok(None)` when the document does not exist.
    async fn fetch(&self) -> Result<Option<Vec<LayoutRecord>>, RepoError>;
}

/// Key/object sink for rendered artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<(), RepoError>;
}
