//! Aggregation reconciler: diff a requested tag set against stored
//! attributions and apply only the difference.
//!
//! Must run inside one write transaction per (user, book). Counter deltas
//! follow attribution changes one to one: a create that found the row
//! already present, or a delete that found nothing, moves no counter.

use super::counters;
use super::engine::TagResult;
use crate::model::{Attribution, BookId, Delta, DeltaOutcome, TagId, UserId};
use crate::storage::StoreTransaction;
use serde::Serialize;
use std::collections::BTreeSet;

/// Which counter a warning refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// `user_count` / `tag_count` on the (book, tag) row
    BookTag,
    /// `global_count` on the tag row
    Global,
}

/// A decrement that was skipped to keep a counter non-negative.
///
/// Recorded and logged; the call still succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityWarning {
    pub counter: CounterKind,
    pub book: BookId,
    pub tag: TagId,
    pub outcome: DeltaOutcome,
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.counter {
            CounterKind::BookTag => "user_count",
            CounterKind::Global => "global_count",
        };
        let why = match self.outcome {
            DeltaOutcome::Missing => "row missing",
            _ => "already zero",
        };
        write!(f, "{} for book {} tag {} not decremented: {}", what, self.book, self.tag, why)
    }
}

/// Result of one reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<TagId>,
    pub removed: Vec<TagId>,
    pub warnings: Vec<IntegrityWarning>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Make `wanted` the user's attribution set for `book`.
///
/// Tags present in both the stored and the wanted set are not touched.
pub fn reconcile(
    tx: &dyn StoreTransaction,
    user: UserId,
    book: BookId,
    wanted: &BTreeSet<TagId>,
) -> TagResult<ReconcileOutcome> {
    let stored = tx.attributed_tags(user, book)?;
    let mut outcome = ReconcileOutcome::default();

    for &tag in stored.difference(wanted) {
        if !tx.delete_attribution(user, book, tag)? {
            tracing::debug!(user = %user, book = %book, tag = %tag, "attribution already gone");
            continue;
        }
        outcome.warnings.extend(counters::apply_delta(tx, book, tag, Delta::Decrement)?);
        outcome.warnings.extend(counters::apply_global_delta(tx, book, tag, Delta::Decrement)?);
        outcome.removed.push(tag);
    }

    for &tag in wanted.difference(&stored) {
        if !tx.insert_attribution(&Attribution::new(user, book, tag))? {
            tracing::debug!(user = %user, book = %book, tag = %tag, "attribution already present");
            continue;
        }
        outcome.warnings.extend(counters::apply_delta(tx, book, tag, Delta::Increment)?);
        outcome.warnings.extend(counters::apply_global_delta(tx, book, tag, Delta::Increment)?);
        outcome.added.push(tag);
    }

    Ok(outcome)
}
