//! Application services: classification, cached read models, rendering,
//! publishing, and the hook boundary that wires them together.

pub mod classify;
pub mod error;
pub mod hooks;
pub mod items;
pub mod layouts;
pub mod publish;
pub mod render;
pub mod repos;
