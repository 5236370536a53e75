//! Query result structures

use crate::model::{BookId, Tag, TagId};
use serde::Serialize;

/// One canonical tag in a book's ranking, with aliases folded in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedTag {
    pub tag: TagId,
    pub name: String,
    pub base_count: u64,
    pub user_count: u64,
    pub tag_count: u64,
}

/// Result of a top-tags query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopTagsResult {
    pub book: BookId,
    /// Ranked tags, at most `limit` of them
    pub tags: Vec<RankedTag>,
    /// Groups with a non-zero total before the limit was applied
    pub total_count: usize,
}

/// Global usage of a tag and everything merged into it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagUsage {
    /// The tag row as stored
    pub tag: Tag,
    /// Where the tag resolves to; `None` when its chain ends at a blocked tag
    pub canonical: Option<Tag>,
    /// Distinct (user, book) attributions across the canonical and every
    /// alias resolving to it. Zero when the tag is blocked.
    pub effective_global_count: u64,
    /// Tags whose chain resolves to the canonical, excluding the canonical
    pub aliases: Vec<TagId>,
}

/// A (book, tag) counter that disagrees with its attributions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterMismatch {
    pub book: BookId,
    pub tag: TagId,
    /// `None` when attributions exist with no counter row
    pub user_count: Option<u64>,
    pub attributions: u64,
    /// True when the stored tag_count is not base_count + user_count
    pub inconsistent_total: bool,
}

/// A tag whose `global_count` disagrees with its attributions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalMismatch {
    pub tag: TagId,
    pub global_count: u64,
    pub attributions: u64,
}

/// Result of a counter audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterAudit {
    pub counters_checked: usize,
    pub tags_checked: usize,
    pub counter_mismatches: Vec<CounterMismatch>,
    pub global_mismatches: Vec<GlobalMismatch>,
}

impl CounterAudit {
    pub fn is_clean(&self) -> bool {
        self.counter_mismatches.is_empty() && self.global_mismatches.is_empty()
    }
}
