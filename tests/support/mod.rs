//! In-memory collaborators for pipeline integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use vetrina::application::repos::{ArtifactStore, LayoutSource, MirrorRepo, RepoError};
use vetrina::domain::entities::{ContentItem, Flag, FlagSet, MirrorRecord};
use vetrina::domain::layouts::LayoutRecord;

/// Mirror store backed by a plain map, with switches to fail the batched
/// capacity count (exercising the per-flag fallback) or every write
/// (exercising the hook boundary's error swallowing).
#[derive(Default)]
pub struct MemoryMirror {
    rows: Mutex<BTreeMap<i64, MirrorRecord>>,
    pub fail_batch_counts: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, id: i64) -> Option<MirrorRecord> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl MirrorRepo for MemoryMirror {
    async fn find(&self, id: i64) -> Result<Option<MirrorRecord>, RepoError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn scan(&self) -> Result<Vec<MirrorRecord>, RepoError> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn insert(&self, record: &MirrorRecord) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("write refused".to_string()));
        }
        self.rows.lock().unwrap().insert(record.id, record.clone());
        Ok(())
    }

    async fn update_flags(
        &self,
        id: i64,
        flags: FlagSet,
        modified_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("write refused".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        row.flags = flags;
        row.modified_at = modified_at;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("write refused".to_string()));
        }
        self.rows.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn count_members(
        &self,
        flags: &[Flag],
        exclude_id: i64,
    ) -> Result<BTreeMap<Flag, u64>, RepoError> {
        if self.fail_batch_counts.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let rows = self.rows.lock().unwrap();
        let mut counts = BTreeMap::new();
        for flag in flags {
            let members = rows
                .values()
                .filter(|row| row.id != exclude_id && row.flags.get(*flag))
                .count() as u64;
            counts.insert(*flag, members);
        }
        Ok(counts)
    }

    async fn count_flag(&self, flag: Flag, exclude_id: i64) -> Result<u64, RepoError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|row| row.id != exclude_id && row.flags.get(flag))
            .count() as u64)
    }
}

/// Layout source serving whatever document the test installed.
#[derive(Default)]
pub struct MemoryLayouts {
    records: Mutex<Option<Vec<LayoutRecord>>>,
}

impl MemoryLayouts {
    pub fn with(records: Vec<LayoutRecord>) -> Self {
        Self {
            records: Mutex::new(Some(records)),
        }
    }

    pub fn install(&self, records: Vec<LayoutRecord>) {
        *self.records.lock().unwrap() = Some(records);
    }
}

#[async_trait]
impl LayoutSource for MemoryLayouts {
    async fn fetch(&self) -> Result<Option<Vec<LayoutRecord>>, RepoError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Artifact sink that records every write, keyed by object key.
#[derive(Default)]
pub struct MemoryArtifacts {
    objects: Mutex<HashMap<String, (String, Bytes)>>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, key: &str) -> Option<(String, Bytes)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn body(&self, key: &str) -> Option<String> {
        self.object(key)
            .map(|(_, body)| String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<(), RepoError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content_type.to_string(), body));
        Ok(())
    }
}

pub fn layout(name: &str, body: &str, limit: u32, file: &str) -> LayoutRecord {
    LayoutRecord {
        active: true,
        layout_name: name.to_string(),
        layout_body: body.to_string(),
        layout_order: String::new(),
        layout_limit: limit,
        layout_file: file.to_string(),
        layout_css: None,
        layout_js: None,
        layout_where: None,
    }
}

pub fn item(id: i64, heading: &str, flags: FlagSet) -> ContentItem {
    ContentItem {
        id,
        heading: heading.to_string(),
        flags,
        ..ContentItem::default()
    }
}

/// Let fire-and-forget artifact writes run to completion on the
/// current-thread test runtime.
pub async fn drain_spawned() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
