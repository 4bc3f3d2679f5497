//! Domain model: items, flags, layouts, and the selection rule grammar.

pub mod entities;
pub mod error;
pub mod layouts;
pub mod rules;
