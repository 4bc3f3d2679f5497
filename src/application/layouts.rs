//! Layout registry: the TTL-cached view of active layout definitions.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tracing::warn;

use crate::cache::PipelineCaches;
use crate::domain::layouts::{LayoutDefinition, LayoutKind};

use super::repos::LayoutSource;

const SOURCE: &str = "application::layouts";

/// One coherent view of the active layouts, shared for a TTL window.
#[derive(Debug, Clone, Default)]
pub struct LayoutSnapshot {
    /// Every active layout, in document order.
    pub all: Vec<LayoutDefinition>,
    /// The subset whose names classify as `Group<N>`.
    pub group_style: Vec<LayoutDefinition>,
    /// Lookup by exact layout name.
    pub by_name: HashMap<String, LayoutDefinition>,
}

impl LayoutSnapshot {
    pub fn build(records: Vec<crate::domain::layouts::LayoutRecord>) -> Self {
        let all: Vec<LayoutDefinition> = records
            .into_iter()
            .map(LayoutDefinition::from_record)
            .filter(|layout| layout.active)
            .collect();
        let group_style = all
            .iter()
            .filter(|layout| matches!(layout.kind(), LayoutKind::Group(_)))
            .cloned()
            .collect();
        let by_name = all
            .iter()
            .map(|layout| (layout.name.clone(), layout.clone()))
            .collect();
        Self {
            all,
            group_style,
            by_name,
        }
    }

    /// The active `Highlight<slot>` layout, when one is configured.
    pub fn highlight_layout(&self, slot: u8) -> Option<&LayoutDefinition> {
        self.all
            .iter()
            .find(|layout| layout.kind() == LayoutKind::Highlight(slot))
    }
}

/// Loads the layout document once per TTL window; a missing or broken source
/// degrades to an empty snapshot so callers see "no groups configured".
#[derive(Clone)]
pub struct LayoutRegistry {
    source: Arc<dyn LayoutSource>,
    caches: Arc<PipelineCaches>,
}

impl LayoutRegistry {
    pub fn new(source: Arc<dyn LayoutSource>, caches: Arc<PipelineCaches>) -> Self {
        Self { source, caches }
    }

    pub async fn active_layouts(&self) -> Arc<LayoutSnapshot> {
        if let Some(snapshot) = self.caches.layouts() {
            counter!("vetrina_layout_cache_hit_total").increment(1);
            return snapshot;
        }
        counter!("vetrina_layout_cache_miss_total").increment(1);

        let records = match self.source.fetch().await {
            Ok(Some(records)) => records,
            Ok(None) => {
                warn!(
                    target: SOURCE,
                    "layout document missing; continuing with no groups configured"
                );
                Vec::new()
            }
            Err(err) => {
                warn!(
                    target: SOURCE,
                    error = %err,
                    "layout document fetch failed; continuing with no groups configured"
                );
                Vec::new()
            }
        };

        let snapshot = Arc::new(LayoutSnapshot::build(records));
        self.caches.store_layouts(Arc::clone(&snapshot));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layouts::LayoutRecord;

    fn record(name: &str, active: bool) -> LayoutRecord {
        LayoutRecord {
            active,
            layout_name: name.to_string(),
            layout_body: String::new(),
            layout_order: String::new(),
            layout_limit: 0,
            layout_file: String::new(),
            layout_css: None,
            layout_js: None,
            layout_where: None,
        }
    }

    #[test]
    fn snapshot_filters_and_partitions() {
        let snapshot = LayoutSnapshot::build(vec![
            record("Highlight1", true),
            record("Group2", true),
            record("Group3", false),
            record("Sidebar", true),
        ]);

        assert_eq!(snapshot.all.len(), 3);
        assert_eq!(snapshot.group_style.len(), 1);
        assert_eq!(snapshot.group_style[0].name, "Group2");
        assert!(snapshot.by_name.contains_key("Sidebar"));
        assert!(!snapshot.by_name.contains_key("Group3"));
        assert!(snapshot.highlight_layout(1).is_some());
        assert!(snapshot.highlight_layout(2).is_none());
    }
}
