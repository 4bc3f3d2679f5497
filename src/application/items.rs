//! Item cache: one mirror scan per TTL window, pre-indexed by flag.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;

use crate::cache::PipelineCaches;
use crate::domain::entities::{Flag, MirrorRecord};

use super::error::AppError;
use super::repos::MirrorRepo;

/// All classified items plus a by-flag index for flag-scoped layouts.
#[derive(Debug, Clone, Default)]
pub struct ItemSnapshot {
    pub all: Vec<MirrorRecord>,
    pub by_flag: HashMap<Flag, Vec<MirrorRecord>>,
}

impl ItemSnapshot {
    pub fn build(all: Vec<MirrorRecord>) -> Self {
        let mut by_flag: HashMap<Flag, Vec<MirrorRecord>> = HashMap::new();
        for record in &all {
            for flag in record.flags.iter_set() {
                by_flag.entry(flag).or_default().push(record.clone());
            }
        }
        Self { all, by_flag }
    }

    pub fn for_flag(&self, flag: Flag) -> &[MirrorRecord] {
        self.by_flag.get(&flag).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// TTL-cached read model over the mirror store.
///
/// Unlike the layout registry this surfaces scan failures: rendering cannot
/// proceed without an item set, and that is the pipeline's one hard stop.
#[derive(Clone)]
pub struct ItemCache {
    repo: Arc<dyn MirrorRepo>,
    caches: Arc<PipelineCaches>,
}

impl ItemCache {
    pub fn new(repo: Arc<dyn MirrorRepo>, caches: Arc<PipelineCaches>) -> Self {
        Self { repo, caches }
    }

    pub async fn classified_items(&self) -> Result<Arc<ItemSnapshot>, AppError> {
        if let Some(snapshot) = self.caches.items() {
            counter!("vetrina_item_cache_hit_total").increment(1);
            return Ok(snapshot);
        }
        counter!("vetrina_item_cache_miss_total").increment(1);

        let all = self.repo.scan().await?;
        let snapshot = Arc::new(ItemSnapshot::build(all));
        self.caches.store_items(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::entities::{ContentItem, FlagSet, MirrorRecord};

    fn record(id: i64, flags: FlagSet) -> MirrorRecord {
        let item = ContentItem {
            id,
            heading: format!("item {id}"),
            ..ContentItem::default()
        };
        MirrorRecord::from_item(&item, flags, OffsetDateTime::UNIX_EPOCH).unwrap()
    }

    #[test]
    fn snapshot_indexes_every_set_flag() {
        let snapshot = ItemSnapshot::build(vec![
            record(1, FlagSet::empty().with(Flag::Highlight(1))),
            record(
                2,
                FlagSet::empty().with(Flag::Highlight(1)).with(Flag::Group(2)),
            ),
            record(3, FlagSet::empty().with(Flag::Group(2))),
        ]);

        assert_eq!(snapshot.all.len(), 3);
        assert_eq!(snapshot.for_flag(Flag::Highlight(1)).len(), 2);
        assert_eq!(snapshot.for_flag(Flag::Group(2)).len(), 2);
        assert!(snapshot.for_flag(Flag::Highlight(5)).is_empty());
    }
}
