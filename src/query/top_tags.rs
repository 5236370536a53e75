//! Per-book tag ranking

use super::types::{RankedTag, TopTagsResult};
use crate::model::{BookId, TagId};
use crate::storage::StoreTransaction;
use crate::tagging::{CanonicalResolver, TagError, TagResult};
use std::collections::BTreeMap;

/// Query for the highest-counted tags on a book
#[derive(Debug, Clone)]
pub struct TopTagsQuery {
    pub book: BookId,
    /// Maximum number of results; must be at least 1
    pub limit: usize,
}

impl TopTagsQuery {
    pub fn new(book: BookId, limit: usize) -> Self {
        Self { book, limit }
    }

    /// Execute the query inside an open transaction.
    ///
    /// Counter rows of merged tags are folded into their canonical before
    /// ranking. Seed weights are summed; users are counted once per group
    /// even when they attributed both an alias and its canonical. Rows whose
    /// tag resolves to nothing (blocked) are left out, as are groups whose
    /// total is zero. Ties rank by normalized name.
    pub fn execute(
        &self,
        tx: &dyn StoreTransaction,
        resolver: &CanonicalResolver,
    ) -> TagResult<TopTagsResult> {
        if self.limit == 0 {
            return Err(TagError::Validation("limit must be at least 1".into()));
        }
        if !tx.book_exists(self.book)? {
            return Err(TagError::BookNotFound(self.book));
        }

        let mut groups: BTreeMap<TagId, Group> = BTreeMap::new();
        for counter in tx.book_counters(self.book)? {
            let Some(canonical) = resolver.resolve_id(tx, counter.tag)? else {
                continue;
            };
            let group = groups.entry(canonical.id).or_insert_with(|| Group {
                key: canonical.key.clone(),
                members: Vec::new(),
                ranked: RankedTag {
                    tag: canonical.id,
                    name: canonical.name.clone(),
                    base_count: 0,
                    user_count: 0,
                    tag_count: 0,
                },
            });
            group.members.push(counter.tag);
            group.ranked.base_count += counter.base_count;
            group.ranked.user_count += counter.user_count;
        }

        let mut ranked = Vec::with_capacity(groups.len());
        for mut group in groups.into_values() {
            if group.members.len() > 1 {
                group.ranked.user_count = tx.count_book_users(self.book, &group.members)?;
            }
            group.ranked.tag_count = group.ranked.base_count + group.ranked.user_count;
            if group.ranked.tag_count > 0 {
                ranked.push(group);
            }
        }
        ranked.sort_by(|a, b| {
            b.ranked
                .tag_count
                .cmp(&a.ranked.tag_count)
                .then_with(|| a.key.cmp(&b.key))
                .then_with(|| a.ranked.name.cmp(&b.ranked.name))
                .then_with(|| a.ranked.tag.cmp(&b.ranked.tag))
        });
        let mut tags: Vec<RankedTag> = ranked.into_iter().map(|g| g.ranked).collect();

        let total_count = tags.len();
        tags.truncate(self.limit);
        Ok(TopTagsResult {
            book: self.book,
            tags,
            total_count,
        })
    }
}

/// A canonical tag and the counter rows folded into it
struct Group {
    key: String,
    members: Vec<TagId>,
    ranked: RankedTag,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attribution, Book, Delta, TagStatus, UserId};
    use crate::storage::{OpenStore, SqliteStore, TagStore};

    fn setup(counts: &[(&str, u64)]) -> (SqliteStore, BookId, Vec<TagId>) {
        let store = SqliteStore::open_in_memory().unwrap();
        let book = BookId::new(7);
        let ids = {
            let tx = store.begin_write().unwrap();
            tx.insert_book(&Book::new(book, "Ranked")).unwrap();
            let ids = counts
                .iter()
                .map(|(name, base)| {
                    let (tag, _) = tx.insert_tag_if_absent(name, name).unwrap();
                    tx.seed_counter(book, tag.id, *base).unwrap();
                    tag.id
                })
                .collect();
            tx.commit().unwrap();
            ids
        };
        (store, book, ids)
    }

    fn names(result: &TopTagsResult) -> Vec<&str> {
        result.tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn orders_by_count_then_name() {
        let (store, book, _) = setup(&[("mystery", 3), ("family", 5), ("adventure", 3), ("empty", 0)]);
        let tx = store.begin_read().unwrap();

        let result = TopTagsQuery::new(book, 10)
            .execute(tx.as_ref(), &CanonicalResolver::new(8))
            .unwrap();
        assert_eq!(names(&result), vec!["family", "adventure", "mystery"]);
        assert_eq!(result.total_count, 3);
    }

    #[test]
    fn limit_applies_after_ranking() {
        let (store, book, _) = setup(&[("a", 1), ("b", 2), ("c", 3)]);
        let tx = store.begin_read().unwrap();

        let result = TopTagsQuery::new(book, 2)
            .execute(tx.as_ref(), &CanonicalResolver::new(8))
            .unwrap();
        assert_eq!(names(&result), vec!["c", "b"]);
        assert_eq!(result.total_count, 3);
    }

    #[test]
    fn aliases_are_summed_into_canonical_before_limit() {
        let (store, book, ids) = setup(&[("growth", 2), ("grow", 2), ("family", 3)]);
        {
            let tx = store.begin_write().unwrap();
            tx.set_tag_status(ids[1], TagStatus::Merged(ids[0])).unwrap();
            tx.commit().unwrap();
        }
        let tx = store.begin_read().unwrap();

        let result = TopTagsQuery::new(book, 1)
            .execute(tx.as_ref(), &CanonicalResolver::new(8))
            .unwrap();
        assert_eq!(result.tags.len(), 1);
        assert_eq!(result.tags[0].tag, ids[0]);
        assert_eq!(result.tags[0].base_count, 4);
        assert_eq!(result.tags[0].tag_count, 4);
    }

    #[test]
    fn one_user_on_alias_and_canonical_counts_once() {
        let (store, book, ids) = setup(&[("growth", 0), ("grow", 0)]);
        let (growth, grow) = (ids[0], ids[1]);
        {
            let tx = store.begin_write().unwrap();
            for (user, tag) in [(1, grow), (1, growth), (2, grow)] {
                tx.insert_attribution(&Attribution::new(UserId::new(user), book, tag))
                    .unwrap();
                tx.apply_counter_delta(book, tag, Delta::Increment).unwrap();
            }
            tx.set_tag_status(grow, TagStatus::Merged(growth)).unwrap();
            tx.commit().unwrap();
        }
        let tx = store.begin_read().unwrap();

        let result = TopTagsQuery::new(book, 10)
            .execute(tx.as_ref(), &CanonicalResolver::new(8))
            .unwrap();
        assert_eq!(result.tags.len(), 1);
        assert_eq!(result.tags[0].tag, growth);
        assert_eq!(result.tags[0].user_count, 2);
        assert_eq!(result.tags[0].tag_count, 2);
    }

    #[test]
    fn ties_rank_by_normalized_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let book = BookId::new(7);
        {
            let tx = store.begin_write().unwrap();
            tx.insert_book(&Book::new(book, "Ranked")).unwrap();
            for (name, key) in [("Zebra", "zebra"), ("apple", "apple"), ("Mango", "mango")] {
                let (tag, _) = tx.insert_tag_if_absent(name, key).unwrap();
                tx.seed_counter(book, tag.id, 2).unwrap();
            }
            tx.commit().unwrap();
        }
        let tx = store.begin_read().unwrap();

        let result = TopTagsQuery::new(book, 10)
            .execute(tx.as_ref(), &CanonicalResolver::new(8))
            .unwrap();
        assert_eq!(names(&result), vec!["apple", "Mango", "Zebra"]);
    }

    #[test]
    fn blocked_tags_are_excluded() {
        let (store, book, ids) = setup(&[("spoiler", 9), ("family", 1)]);
        {
            let tx = store.begin_write().unwrap();
            tx.set_tag_status(ids[0], TagStatus::Blocked).unwrap();
            tx.commit().unwrap();
        }
        let tx = store.begin_read().unwrap();

        let result = TopTagsQuery::new(book, 10)
            .execute(tx.as_ref(), &CanonicalResolver::new(8))
            .unwrap();
        assert_eq!(names(&result), vec!["family"]);
    }

    #[test]
    fn zero_limit_and_unknown_book_are_rejected() {
        let (store, book, _) = setup(&[]);
        let tx = store.begin_read().unwrap();
        let resolver = CanonicalResolver::new(8);

        let err = TopTagsQuery::new(book, 0).execute(tx.as_ref(), &resolver).unwrap_err();
        assert!(matches!(err, TagError::Validation(_)));

        let err = TopTagsQuery::new(BookId::new(404), 5)
            .execute(tx.as_ref(), &resolver)
            .unwrap_err();
        assert!(matches!(err, TagError::BookNotFound(_)));
    }
}
