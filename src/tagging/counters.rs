//! Counter model: atomic deltas with a floor at zero
//!
//! Deltas are pushed down to storage as single atomic statements. Nothing
//! here reads a count, adjusts it in memory and writes it back.

use super::engine::{fault, IntegrityFault, TagResult};
use super::reconciler::{CounterKind, IntegrityWarning};
use crate::model::{BookId, BookTagCounter, Delta, DeltaOutcome, TagId};
use crate::storage::StoreTransaction;

/// Apply a unit delta to the (book, tag) `user_count`, rewriting `tag_count`.
///
/// A decrement that would go below zero is skipped and reported as a
/// warning instead of corrupting the row.
pub fn apply_delta(
    tx: &dyn StoreTransaction,
    book: BookId,
    tag: TagId,
    delta: Delta,
) -> TagResult<Option<IntegrityWarning>> {
    let outcome = tx.apply_counter_delta(book, tag, delta)?;
    tracing::debug!(book = %book, tag = %tag, %delta, ?outcome, "book-tag delta");
    Ok(warning_for(CounterKind::BookTag, book, tag, outcome))
}

/// Apply a unit delta to a tag's `global_count`.
///
/// Same floor policy as [`apply_delta`]. The tag row must exist: the
/// attribution being added or removed references it.
pub fn apply_global_delta(
    tx: &dyn StoreTransaction,
    book: BookId,
    tag: TagId,
    delta: Delta,
) -> TagResult<Option<IntegrityWarning>> {
    match tx.apply_global_delta(tag, delta)? {
        DeltaOutcome::Missing => Err(fault(IntegrityFault::MissingTag(tag))),
        outcome => Ok(warning_for(CounterKind::Global, book, tag, outcome)),
    }
}

pub fn read_current(
    tx: &dyn StoreTransaction,
    book: BookId,
    tag: TagId,
) -> TagResult<Option<BookTagCounter>> {
    Ok(tx.read_counter(book, tag)?)
}

fn warning_for(
    counter: CounterKind,
    book: BookId,
    tag: TagId,
    outcome: DeltaOutcome,
) -> Option<IntegrityWarning> {
    if outcome == DeltaOutcome::Applied {
        return None;
    }
    let warning = IntegrityWarning {
        counter,
        book,
        tag,
        outcome,
    };
    tracing::warn!(%warning, "counter decrement skipped");
    Some(warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Book;
    use crate::storage::{OpenStore, SqliteStore, TagStore};

    fn setup() -> (SqliteStore, BookId, TagId) {
        let store = SqliteStore::open_in_memory().unwrap();
        let book = BookId::new(1);
        let tag = {
            let tx = store.begin_write().unwrap();
            tx.insert_book(&Book::new(book, "Counted")).unwrap();
            let (tag, _) = tx.insert_tag_if_absent("growth", "growth").unwrap();
            tx.commit().unwrap();
            tag.id
        };
        (store, book, tag)
    }

    #[test]
    fn increment_then_read_current() {
        let (store, book, tag) = setup();
        let tx = store.begin_write().unwrap();

        assert!(apply_delta(tx.as_ref(), book, tag, Delta::Increment).unwrap().is_none());
        let counter = read_current(tx.as_ref(), book, tag).unwrap().unwrap();
        assert_eq!((counter.base_count, counter.user_count, counter.tag_count), (0, 1, 1));
    }

    #[test]
    fn decrement_at_zero_warns() {
        let (store, book, tag) = setup();
        let tx = store.begin_write().unwrap();
        tx.seed_counter(book, tag, 2).unwrap();

        let warning = apply_delta(tx.as_ref(), book, tag, Delta::Decrement)
            .unwrap()
            .unwrap();
        assert_eq!(warning.counter, CounterKind::BookTag);
        assert_eq!(warning.outcome, DeltaOutcome::Floored);

        let counter = read_current(tx.as_ref(), book, tag).unwrap().unwrap();
        assert_eq!((counter.base_count, counter.user_count, counter.tag_count), (2, 0, 2));
    }

    #[test]
    fn decrement_missing_row_warns() {
        let (store, book, tag) = setup();
        let tx = store.begin_write().unwrap();
        let warning = apply_delta(tx.as_ref(), book, tag, Delta::Decrement)
            .unwrap()
            .unwrap();
        assert_eq!(warning.outcome, DeltaOutcome::Missing);
    }

    #[test]
    fn global_decrement_at_zero_warns() {
        let (store, book, tag) = setup();
        let tx = store.begin_write().unwrap();
        let warning = apply_global_delta(tx.as_ref(), book, tag, Delta::Decrement)
            .unwrap()
            .unwrap();
        assert_eq!(warning.counter, CounterKind::Global);
        assert_eq!(tx.load_tag(tag).unwrap().unwrap().global_count, 0);
    }

    #[test]
    fn global_delta_on_missing_tag_is_fault() {
        let (store, book, _) = setup();
        let tx = store.begin_write().unwrap();
        let err = apply_global_delta(tx.as_ref(), book, TagId::new(999), Delta::Increment)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::tagging::TagError::Integrity(IntegrityFault::MissingTag(_))
        ));
    }
}
