//! Read surface over books, tags and counters
//!
//! Queries run inside a read transaction and resolve merged and blocked
//! tags at read time, so results always reflect the current directory.

mod audit;
mod top_tags;
mod types;
mod usage;

pub use top_tags::TopTagsQuery;
pub use types::{
    CounterAudit, CounterMismatch, GlobalMismatch, RankedTag, TagUsage, TopTagsResult,
};
pub use usage::TagUsageQuery;

use crate::model::{BookId, TagId};
use crate::tagging::{TagEngine, TagResult};

impl TagEngine {
    /// Highest-counted canonical tags on a book
    pub fn top_tags_for_book(&self, book: BookId, limit: usize) -> TagResult<TopTagsResult> {
        let tx = self.store().begin_read()?;
        TopTagsQuery::new(book, limit).execute(tx.as_ref(), self.resolver())
    }

    /// Top tags using the configured default limit
    pub fn top_tags(&self, book: BookId) -> TagResult<TopTagsResult> {
        self.top_tags_for_book(book, self.config().default_top_limit)
    }

    pub fn tag_usage(&self, tag: TagId) -> TagResult<TagUsage> {
        let tx = self.store().begin_read()?;
        TagUsageQuery::new(tag).execute(tx.as_ref(), self.resolver())
    }

    /// Compare every counter with its attributions without repairing drift
    pub fn audit_counters(&self) -> TagResult<CounterAudit> {
        let tx = self.store().begin_read()?;
        audit::audit(tx.as_ref())
    }
}
