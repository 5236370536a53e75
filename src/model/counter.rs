//! Per-(book, tag) counters and the deltas applied to them

use super::book::BookId;
use super::tag::TagId;
use serde::{Deserialize, Serialize};

/// Aggregate counts for one book/tag pair.
///
/// `tag_count` is stored but always written as `base_count + user_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTagCounter {
    pub book: BookId,
    pub tag: TagId,
    pub base_count: u64,
    pub user_count: u64,
    pub tag_count: u64,
}

impl BookTagCounter {
    /// True when the stored total matches its parts
    pub fn is_consistent(&self) -> bool {
        self.tag_count == self.base_count + self.user_count
    }
}

/// A unit change to a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increment,
    Decrement,
}

impl Delta {
    pub fn signed(self) -> i64 {
        match self {
            Delta::Increment => 1,
            Delta::Decrement => -1,
        }
    }
}

impl std::fmt::Display for Delta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delta::Increment => write!(f, "+1"),
            Delta::Decrement => write!(f, "-1"),
        }
    }
}

/// What happened when a delta hit storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOutcome {
    Applied,
    /// Decrement skipped because the count was already zero
    Floored,
    /// The target row does not exist
    Missing,
}
