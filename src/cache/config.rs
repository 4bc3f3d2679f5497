//! Cache TTL configuration.
//!
//! Item entries expire faster than layout entries because content changes
//! far more often than layout configuration.

use serde::Deserialize;
use time::Duration;

const DEFAULT_LAYOUT_TTL_SECS: u64 = 300;
const DEFAULT_ITEM_TTL_SECS: u64 = 60;
const DEFAULT_TABLE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Layout-registry snapshot lifetime.
    pub layout_ttl_secs: u64,
    /// Classified-item snapshot lifetime.
    pub item_ttl_secs: u64,
    /// Table-existence probe lifetime.
    pub table_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            layout_ttl_secs: DEFAULT_LAYOUT_TTL_SECS,
            item_ttl_secs: DEFAULT_ITEM_TTL_SECS,
            table_ttl_secs: DEFAULT_TABLE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn layout_ttl(&self) -> Duration {
        Duration::seconds(self.layout_ttl_secs as i64)
    }

    pub fn item_ttl(&self) -> Duration {
        Duration::seconds(self.item_ttl_secs as i64)
    }

    pub fn table_ttl(&self) -> Duration {
        Duration::seconds(self.table_ttl_secs as i64)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            layout_ttl_secs: settings.layout_ttl_secs,
            item_ttl_secs: settings.item_ttl_secs,
            table_ttl_secs: settings.table_ttl_secs,
        }
    }
}
