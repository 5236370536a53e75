//! Moderation: block, unblock and merge tags in the directory
//!
//! Status changes only. Attributions and counters stay where they are; the
//! resolver applies the new status lazily on the next submit or read.

use super::engine::{TagEngine, TagError, TagResult};
use crate::model::{Tag, TagId, TagStatus};
use crate::storage::StoreTransaction;

impl TagEngine {
    /// Block a tag so it is dropped from future submissions.
    ///
    /// Blocking an already blocked tag is a no-op.
    pub fn block_tag(&self, id: TagId) -> TagResult<Tag> {
        self.set_status(id, |tag| match tag.status {
            TagStatus::Active => Ok(Some(TagStatus::Blocked)),
            TagStatus::Blocked => Ok(None),
            TagStatus::Merged(into) => Err(TagError::Validation(format!(
                "tag {} is merged into tag {}; block the canonical instead",
                tag.id, into
            ))),
        })
    }

    /// Return a blocked tag to Active. Unblocking an active tag is a no-op.
    pub fn unblock_tag(&self, id: TagId) -> TagResult<Tag> {
        self.set_status(id, |tag| match tag.status {
            TagStatus::Blocked => Ok(Some(TagStatus::Active)),
            TagStatus::Active => Ok(None),
            TagStatus::Merged(_) => Err(TagError::Validation(format!(
                "tag {} is merged and cannot be unblocked",
                tag.id
            ))),
        })
    }

    /// Merge `alias` into the canonical tag `target` resolves to.
    ///
    /// The alias must be Active. The link is written straight to the
    /// resolved canonical, and every tag already merged into the alias is
    /// repointed there in the same transaction, so chains stay one hop long
    /// however many merges are stacked through this call.
    pub fn merge_tag(&self, alias: TagId, target: TagId) -> TagResult<Tag> {
        if alias == target {
            return Err(TagError::Validation(format!(
                "tag {} cannot be merged into itself",
                alias
            )));
        }

        let tx = self.store().begin_write()?;
        let alias_tag = load(tx.as_ref(), alias)?;
        if alias_tag.status != TagStatus::Active {
            return Err(TagError::Validation(format!(
                "tag {} is {} and cannot be merged",
                alias,
                alias_tag.status.as_str()
            )));
        }

        load(tx.as_ref(), target)?;
        let canonical = self
            .resolver()
            .resolve_id(tx.as_ref(), target)?
            .ok_or_else(|| {
                TagError::Validation(format!("merge target {} resolves to a blocked tag", target))
            })?;
        if canonical.id == alias {
            return Err(TagError::Validation(format!(
                "merging tag {} into tag {} would create a cycle",
                alias, target
            )));
        }

        let mut repointed = Vec::new();
        for tag in tx.merged_tags()? {
            if tag.id == alias {
                continue;
            }
            let resolved = self.resolver().resolve_id(tx.as_ref(), tag.id)?;
            if resolved.is_some_and(|t| t.id == alias) {
                repointed.push(tag.id);
            }
        }

        tx.set_tag_status(alias, TagStatus::Merged(canonical.id))?;
        for id in &repointed {
            tx.set_tag_status(*id, TagStatus::Merged(canonical.id))?;
        }
        let merged = load(tx.as_ref(), alias)?;
        tx.commit()?;

        tracing::info!(
            alias = %alias,
            canonical = %canonical.id,
            repointed = repointed.len(),
            "merged tag"
        );
        Ok(merged)
    }

    fn set_status(
        &self,
        id: TagId,
        next: impl FnOnce(&Tag) -> TagResult<Option<TagStatus>>,
    ) -> TagResult<Tag> {
        let tx = self.store().begin_write()?;
        let tag = load(tx.as_ref(), id)?;
        let Some(status) = next(&tag)? else {
            return Ok(tag);
        };

        tx.set_tag_status(id, status)?;
        let updated = load(tx.as_ref(), id)?;
        tx.commit()?;

        tracing::info!(tag = %id, status = status.as_str(), "tag status changed");
        Ok(updated)
    }
}

fn load(tx: &dyn StoreTransaction, id: TagId) -> TagResult<Tag> {
    tx.load_tag(id)?.ok_or(TagError::TagNotFound(id))
}
