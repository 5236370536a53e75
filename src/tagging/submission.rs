//! Request and response shapes for tag submission

use super::engine::{TagError, TagResult};
use super::reconciler::IntegrityWarning;
use crate::config::EngineConfig;
use crate::model::{display_name, BookId, Tag, TagId, TagRef, UserId};
use serde::{Deserialize, Serialize};

/// Tags a user selected for a book: existing tags by id plus free-text
/// names for tags that may not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagSubmission {
    pub existing_tag_ids: Vec<TagId>,
    pub new_tag_names: Vec<String>,
}

impl TagSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_id(mut self, id: TagId) -> Self {
        self.existing_tag_ids.push(id);
        self
    }

    pub fn with_tag_name(mut self, name: impl Into<String>) -> Self {
        self.new_tag_names.push(name.into());
        self
    }

    /// Validate the payload and turn it into tag references.
    ///
    /// Blank names are skipped. Ids must be positive; names must fit the
    /// configured length after whitespace folding.
    pub fn to_refs(&self, config: &EngineConfig) -> TagResult<Vec<TagRef>> {
        let total = self.existing_tag_ids.len() + self.new_tag_names.len();
        if total > config.max_tags_per_submission {
            return Err(TagError::Validation(format!(
                "{} tags submitted, limit is {}",
                total, config.max_tags_per_submission
            )));
        }

        let mut refs = Vec::with_capacity(total);
        for id in &self.existing_tag_ids {
            if id.get() <= 0 {
                return Err(TagError::Validation(format!("invalid tag id {}", id)));
            }
            refs.push(TagRef::ById(*id));
        }
        for raw in &self.new_tag_names {
            let name = display_name(raw);
            if name.is_empty() {
                continue;
            }
            let len = name.chars().count();
            if len > config.max_tag_name_len {
                return Err(TagError::Validation(format!(
                    "tag name is {} characters, limit is {}",
                    len, config.max_tag_name_len
                )));
            }
            refs.push(TagRef::ByName(name));
        }
        Ok(refs)
    }
}

/// The user's attribution set after a submit or clear
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTagSet {
    pub user: UserId,
    pub book: BookId,
    /// Tags now attributed, sorted by name
    pub tags: Vec<Tag>,
    pub added: Vec<TagId>,
    pub removed: Vec<TagId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<IntegrityWarning>,
}

impl AppliedTagSet {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn tag_ids(&self) -> Vec<TagId> {
        self.tags.iter().map(|t| t.id).collect()
    }
}
