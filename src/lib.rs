//! Vetrina classifies content items into capacity-bounded editorial groups
//! and renders per-group static artifacts from a small templating language.
//!
//! The pipeline reacts to content mutations: the classification engine
//! recomputes group membership and maintains a denormalized mirror store,
//! while the render engine interprets layout templates against TTL-cached
//! read models and hands the produced artifacts to the publisher. Nothing in
//! this crate is allowed to fail the content operation that triggered it.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
