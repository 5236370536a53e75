//! Canonical resolution of tag references
//!
//! Merges and blocks are never migrated eagerly. Every write and every read
//! that needs an effective tag goes through here, so an alias always counts
//! toward its canonical and a blocked tag never enters a new attribution.

use super::engine::{fault, IntegrityFault, TagResult};
use crate::model::{display_name, normalize_name, Tag, TagId, TagRef, TagStatus};
use crate::storage::StoreTransaction;
use std::collections::HashSet;

/// Resolves tag references to their effective canonical tag
#[derive(Debug, Clone)]
pub struct CanonicalResolver {
    max_hops: usize,
}

impl CanonicalResolver {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    /// Resolve a reference, creating an Active tag for an unseen name.
    ///
    /// `None` means the reference is dropped: a stale id, a blank name, or a
    /// tag whose chain ends at a Blocked tag.
    pub fn resolve(&self, tx: &dyn StoreTransaction, tag_ref: &TagRef) -> TagResult<Option<Tag>> {
        match tag_ref {
            TagRef::ById(id) => self.resolve_id(tx, *id),
            TagRef::ByName(raw) => {
                let key = normalize_name(raw);
                if key.is_empty() {
                    return Ok(None);
                }
                let (tag, created) = tx.insert_tag_if_absent(&display_name(raw), &key)?;
                if created {
                    tracing::info!(tag = %tag.id, key = %tag.key, "created tag");
                }
                self.follow(tx, tag)
            }
        }
    }

    /// Resolve without ever creating a tag
    pub fn resolve_existing(
        &self,
        tx: &dyn StoreTransaction,
        tag_ref: &TagRef,
    ) -> TagResult<Option<Tag>> {
        match tag_ref {
            TagRef::ById(id) => self.resolve_id(tx, *id),
            TagRef::ByName(raw) => {
                let key = normalize_name(raw);
                if key.is_empty() {
                    return Ok(None);
                }
                match tx.find_tag_by_key(&key)? {
                    Some(tag) => self.follow(tx, tag),
                    None => Ok(None),
                }
            }
        }
    }

    pub fn resolve_id(&self, tx: &dyn StoreTransaction, id: TagId) -> TagResult<Option<Tag>> {
        match tx.load_tag(id)? {
            Some(tag) => self.follow(tx, tag),
            None => {
                tracing::debug!(tag = %id, "dropping stale tag id");
                Ok(None)
            }
        }
    }

    /// Resolve every reference, dropping `None`s and collapsing references
    /// that land on the same canonical tag. First-seen order is kept.
    pub fn resolve_batch(&self, tx: &dyn StoreTransaction, refs: &[TagRef]) -> TagResult<Vec<Tag>> {
        let mut seen = HashSet::new();
        let mut tags = Vec::with_capacity(refs.len());
        for tag_ref in refs {
            if let Some(tag) = self.resolve(tx, tag_ref)? {
                if seen.insert(tag.id) {
                    tags.push(tag);
                }
            }
        }
        Ok(tags)
    }

    /// Walk merge links from `tag` to the first non-merged tag.
    fn follow(&self, tx: &dyn StoreTransaction, tag: Tag) -> TagResult<Option<Tag>> {
        let start = tag.id;
        let mut visited = HashSet::from([start]);
        let mut current = tag;
        let mut hops = 0;

        loop {
            match current.status {
                TagStatus::Active => return Ok(Some(current)),
                TagStatus::Blocked => return Ok(None),
                TagStatus::Merged(target) => {
                    if !visited.insert(target) {
                        return Err(fault(IntegrityFault::MergeCycle {
                            start,
                            repeated: target,
                        }));
                    }
                    if hops == self.max_hops {
                        return Err(fault(IntegrityFault::HopLimitExceeded {
                            start,
                            max_hops: self.max_hops,
                        }));
                    }
                    hops += 1;
                    let alias = current.id;
                    current = tx.load_tag(target)?.ok_or_else(|| {
                        fault(IntegrityFault::MissingCanonical { alias, target })
                    })?;
                }
            }
        }
    }
}
