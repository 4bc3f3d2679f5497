//! TTL cache slots and the process-wide pipeline cache state.
//!
//! There is no invalidation signal besides expiry; `clear_all` exists so an
//! admin cache-bust can force every reader back to the source on its next
//! load.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::application::items::ItemSnapshot;
use crate::application::layouts::LayoutSnapshot;

use super::clock::Clock;
use super::config::CacheConfig;

const SOURCE: &str = "cache::store";

fn slot_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(target: SOURCE, op, "recovered poisoned cache lock; state may be stale");
        poisoned.into_inner()
    })
}

fn slot_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(target: SOURCE, op, "recovered poisoned cache lock; state may be stale");
        poisoned.into_inner()
    })
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    loaded_at: OffsetDateTime,
}

/// A single cached value with a load timestamp; expiry is decided by the
/// caller-supplied `now` so tests can drive time explicitly.
#[derive(Debug)]
pub struct TtlSlot<T> {
    op: &'static str,
    entry: RwLock<Option<Entry<T>>>,
}

impl<T: Clone> TtlSlot<T> {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            entry: RwLock::new(None),
        }
    }

    /// The cached value, unless absent or older than `ttl`.
    pub fn get(&self, now: OffsetDateTime, ttl: Duration) -> Option<T> {
        let guard = slot_read(&self.entry, self.op);
        let entry = guard.as_ref()?;
        if now - entry.loaded_at >= ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, value: T, now: OffsetDateTime) {
        *slot_write(&self.entry, self.op) = Some(Entry {
            value,
            loaded_at: now,
        });
    }

    pub fn clear(&self) {
        *slot_write(&self.entry, self.op) = None;
    }
}

/// The three pipeline caches, keyed by fixed names, sharing one clock.
pub struct PipelineCaches {
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    layouts: TtlSlot<Arc<LayoutSnapshot>>,
    items: TtlSlot<Arc<ItemSnapshot>>,
    table_ready: TtlSlot<bool>,
}

impl PipelineCaches {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            config,
            layouts: TtlSlot::new("layouts"),
            items: TtlSlot::new("items"),
            table_ready: TtlSlot::new("table_ready"),
        }
    }

    pub fn layouts(&self) -> Option<Arc<LayoutSnapshot>> {
        self.layouts
            .get(self.clock.now(), self.config.layout_ttl())
    }

    pub fn store_layouts(&self, snapshot: Arc<LayoutSnapshot>) {
        self.layouts.set(snapshot, self.clock.now());
    }

    pub fn items(&self) -> Option<Arc<ItemSnapshot>> {
        self.items.get(self.clock.now(), self.config.item_ttl())
    }

    pub fn store_items(&self, snapshot: Arc<ItemSnapshot>) {
        self.items.set(snapshot, self.clock.now());
    }

    pub fn table_ready(&self) -> bool {
        self.table_ready
            .get(self.clock.now(), self.config.table_ttl())
            .unwrap_or(false)
    }

    pub fn store_table_ready(&self) {
        self.table_ready.set(true, self.clock.now());
    }

    /// Force-clear every cache; the next reads fall through to their sources.
    pub fn clear_all(&self) {
        self.layouts.clear();
        self.items.clear();
        self.table_ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct ManualClock {
        now: Mutex<OffsetDateTime>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(OffsetDateTime::UNIX_EPOCH),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn slot_expires_after_ttl() {
        let slot: TtlSlot<u32> = TtlSlot::new("test");
        let t0 = OffsetDateTime::UNIX_EPOCH;
        let ttl = Duration::seconds(60);

        assert_eq!(slot.get(t0, ttl), None);
        slot.set(7, t0);
        assert_eq!(slot.get(t0 + Duration::seconds(59), ttl), Some(7));
        assert_eq!(slot.get(t0 + Duration::seconds(60), ttl), None);
    }

    #[test]
    fn slot_clear_discards_value() {
        let slot: TtlSlot<&str> = TtlSlot::new("test");
        slot.set("cached", OffsetDateTime::UNIX_EPOCH);
        slot.clear();
        assert_eq!(
            slot.get(OffsetDateTime::UNIX_EPOCH, Duration::seconds(60)),
            None
        );
    }

    #[test]
    fn pipeline_caches_honor_distinct_ttls() {
        let clock = Arc::new(ManualClock::new());
        let caches = PipelineCaches::new(CacheConfig::default(), clock.clone());

        caches.store_layouts(Arc::new(LayoutSnapshot::default()));
        caches.store_items(Arc::new(ItemSnapshot::default()));
        caches.store_table_ready();

        // Items expire first (1 min), layouts at 5 min, table probe at 10 min.
        clock.advance(Duration::seconds(90));
        assert!(caches.items().is_none());
        assert!(caches.layouts().is_some());
        assert!(caches.table_ready());

        clock.advance(Duration::seconds(300));
        assert!(caches.layouts().is_none());
        assert!(caches.table_ready());

        clock.advance(Duration::seconds(300));
        assert!(!caches.table_ready());
    }

    #[test]
    fn clear_all_busts_every_cache() {
        let clock = Arc::new(ManualClock::new());
        let caches = PipelineCaches::new(CacheConfig::default(), clock);

        caches.store_layouts(Arc::new(LayoutSnapshot::default()));
        caches.store_items(Arc::new(ItemSnapshot::default()));
        caches.store_table_ready();

        caches.clear_all();
        assert!(caches.layouts().is_none());
        assert!(caches.items().is_none());
        assert!(!caches.table_ready());
    }
}
