//! Infrastructure adapters: storage, sinks, telemetry.

pub mod artifacts;
pub mod db;
pub mod error;
pub mod layout_source;
pub mod telemetry;
