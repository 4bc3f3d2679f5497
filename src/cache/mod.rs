//! Process-wide TTL caches backing the pipeline read models.

pub mod clock;
pub mod config;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use config::CacheConfig;
pub use store::{PipelineCaches, TtlSlot};
