//! Classification engine: recomputes group membership on every content
//! mutation and keeps the mirror store in step.
//!
//! Capacity checks are read-then-write with no cross-request locking, so two
//! near-simultaneous classifications can transiently admit more members than
//! a layout's capacity allows. That is a soft bound: the next write corrects
//! it, and no distributed lock is attempted.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, warn};

use crate::cache::Clock;
use crate::domain::entities::{ContentItem, Flag, FlagSet, MirrorRecord, HIGHLIGHT_SLOTS};
use crate::domain::layouts::LayoutKind;
use crate::domain::rules;

use super::error::AppError;
use super::layouts::{LayoutRegistry, LayoutSnapshot};
use super::repos::MirrorRepo;

const SOURCE: &str = "application::classify";

/// Which content mutation triggered classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// Delete mutation: mirror row removed.
    Removed,
    /// Every flag resolved to `No`; any existing mirror row was removed.
    Cleared,
    /// Mirror row inserted or updated with the resolved flags.
    Stored(FlagSet),
}

/// A flag the item may receive, with the capacity of its governing layout
/// (0 = unbounded).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    flag: Flag,
    capacity: u32,
}

pub struct ClassificationService {
    repo: Arc<dyn MirrorRepo>,
    layouts: LayoutRegistry,
    clock: Arc<dyn Clock>,
}

impl ClassificationService {
    pub fn new(repo: Arc<dyn MirrorRepo>, layouts: LayoutRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            layouts,
            clock,
        }
    }

    /// Hook-boundary entry point: never fails. Internal errors are logged and
    /// treated as "no classification change" so the caller's create/update/
    /// delete always completes.
    pub async fn apply(&self, item: &ContentItem, op: MutationKind) {
        if let Err(err) = self.classify(item, op).await {
            counter!("vetrina_classify_error_total").increment(1);
            error!(
                target: SOURCE,
                item_id = item.id,
                error = %err,
                "classification failed; content operation unaffected"
            );
        }
    }

    pub async fn classify(
        &self,
        item: &ContentItem,
        op: MutationKind,
    ) -> Result<ClassifyOutcome, AppError> {
        counter!("vetrina_classify_total").increment(1);

        if op == MutationKind::Delete {
            self.repo.delete(item.id).await?;
            debug!(target: SOURCE, item_id = item.id, "mirror row removed on delete");
            return Ok(ClassifyOutcome::Removed);
        }

        let snapshot = self.layouts.active_layouts().await;
        let resolved = self.resolve_flags(item, &snapshot).await?;

        if !resolved.any() {
            // Membership went to zero: the invariant forbids an all-`No` row.
            self.repo.delete(item.id).await?;
            debug!(target: SOURCE, item_id = item.id, "no memberships; mirror row cleared");
            return Ok(ClassifyOutcome::Cleared);
        }

        let now = self.clock.now();
        if self.repo.find(item.id).await?.is_some() {
            self.repo.update_flags(item.id, resolved, now).await?;
        } else {
            let record = MirrorRecord::from_item(item, resolved, now)?;
            self.repo.insert(&record).await?;
        }
        debug!(
            target: SOURCE,
            item_id = item.id,
            flags = %resolved.iter_set().map(|f| f.column()).collect::<Vec<_>>().join(","),
            "mirror row stored"
        );
        Ok(ClassifyOutcome::Stored(resolved))
    }

    /// Collect candidate flags, then settle capacity-limited ones with one
    /// batched count.
    async fn resolve_flags(
        &self,
        item: &ContentItem,
        snapshot: &LayoutSnapshot,
    ) -> Result<FlagSet, AppError> {
        let mut candidates: Vec<Candidate> = Vec::new();

        // Highlight flags come straight from the editor; classification can
        // only revoke them. A slot without an active layout carries no
        // capacity and stays eligible.
        for slot in 1..=HIGHLIGHT_SLOTS {
            let flag = Flag::Highlight(slot);
            if !item.flags.get(flag) {
                continue;
            }
            let capacity = snapshot
                .highlight_layout(slot)
                .map(|layout| layout.capacity)
                .unwrap_or(0);
            candidates.push(Candidate { flag, capacity });
        }

        // Group flags exist only through an active group-style layout whose
        // rule matches; a blank rule selects all items.
        for layout in &snapshot.group_style {
            let LayoutKind::Group(slot) = layout.kind() else {
                continue;
            };
            let Some(flag) = Flag::group(slot) else {
                continue;
            };
            let matches = match layout.where_clause.as_deref() {
                None => true,
                Some(clause) => rules::evaluate(clause, item),
            };
            if matches {
                candidates.push(Candidate {
                    flag,
                    capacity: layout.capacity,
                });
            }
        }

        let mut resolved = FlagSet::empty();
        for candidate in candidates.iter().filter(|c| c.capacity == 0) {
            resolved.set(candidate.flag, true);
        }

        let limited: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.capacity > 0)
            .copied()
            .collect();
        if limited.is_empty() {
            return Ok(resolved);
        }

        // One aggregate statement covers every limited flag; never one count
        // query per flag.
        let flags: Vec<Flag> = limited.iter().map(|c| c.flag).collect();
        let counts = match self.repo.count_members(&flags, item.id).await {
            Ok(counts) => Some(counts),
            Err(err) => {
                warn!(
                    target: SOURCE,
                    item_id = item.id,
                    error = %err,
                    "batched capacity count failed; falling back to per-flag checks"
                );
                None
            }
        };

        for candidate in limited {
            let admitted = match &counts {
                Some(counts) => {
                    let members = counts.get(&candidate.flag).copied().unwrap_or(0);
                    members < u64::from(candidate.capacity)
                }
                None => match self.repo.count_flag(candidate.flag, item.id).await {
                    Ok(members) => members < u64::from(candidate.capacity),
                    Err(err) => {
                        // Never block an editor's content on a failed count.
                        warn!(
                            target: SOURCE,
                            item_id = item.id,
                            flag = candidate.flag.column(),
                            error = %err,
                            "per-flag capacity count failed; admitting"
                        );
                        true
                    }
                },
            };
            resolved.set(candidate.flag, admitted);
        }

        Ok(resolved)
    }
}
