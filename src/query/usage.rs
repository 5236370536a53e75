//! Global usage of a tag across its alias group

use super::types::TagUsage;
use crate::model::TagId;
use crate::storage::StoreTransaction;
use crate::tagging::{CanonicalResolver, TagError, TagResult};

/// Query for a tag's effective global count.
///
/// Merges never migrate counts, so the effective count is worked out here
/// at read time. A tag with no aliases reports its own `global_count`. For
/// an alias group it is the number of distinct (user, book) pairs
/// attributing any tag in the group, so a user who tagged a book with both
/// an alias and its canonical counts once.
#[derive(Debug, Clone, Copy)]
pub struct TagUsageQuery {
    pub tag: TagId,
}

impl TagUsageQuery {
    pub fn new(tag: TagId) -> Self {
        Self { tag }
    }

    pub fn execute(
        &self,
        tx: &dyn StoreTransaction,
        resolver: &CanonicalResolver,
    ) -> TagResult<TagUsage> {
        let tag = tx.load_tag(self.tag)?.ok_or(TagError::TagNotFound(self.tag))?;
        let Some(canonical) = resolver.resolve_id(tx, tag.id)? else {
            return Ok(TagUsage {
                tag,
                canonical: None,
                effective_global_count: 0,
                aliases: Vec::new(),
            });
        };

        let mut aliases = Vec::new();
        for merged in tx.merged_tags()? {
            if let Some(target) = resolver.resolve_id(tx, merged.id)? {
                if target.id == canonical.id {
                    aliases.push(merged.id);
                }
            }
        }
        aliases.sort();

        let effective = if aliases.is_empty() {
            canonical.global_count
        } else {
            let mut group = aliases.clone();
            group.push(canonical.id);
            tx.count_user_books(&group)?
        };

        Ok(TagUsage {
            tag,
            canonical: Some(canonical),
            effective_global_count: effective,
            aliases,
        })
    }
}
