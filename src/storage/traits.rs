//! Storage trait definitions

use crate::model::{
    Attribution, Book, BookId, BookTagCounter, Delta, DeltaOutcome, Tag, TagId, TagStatus, UserId,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Lock wait exceeded the busy timeout; the transaction never started
    /// or was rolled back.
    #[error("Storage contention: {0}")]
    Contention(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
            if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StorageError::Contention(e.to_string());
            }
        }
        StorageError::Database(e)
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One (book, tag) pair as seen by the counter audit.
///
/// `counter` is `None` when attributions exist without a counter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterAuditRow {
    pub book: BookId,
    pub tag: TagId,
    pub counter: Option<BookTagCounter>,
    pub attributions: u64,
}

/// One tag's global count next to the attributions that reference it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalAuditRow {
    pub tag: TagId,
    pub global_count: u64,
    pub attributions: u64,
}

/// Storage backend for tags, attributions and counters.
///
/// All reads and writes go through a transaction. Implementations must be
/// thread-safe (Send + Sync); a write transaction must exclude other write
/// transactions on the same rows until it commits or is dropped.
pub trait TagStore: Send + Sync {
    /// Begin a write transaction, waiting up to the busy timeout for locks.
    fn begin_write(&self) -> StorageResult<Box<dyn StoreTransaction + '_>>;

    /// Begin a read-only snapshot
    fn begin_read(&self) -> StorageResult<Box<dyn StoreTransaction + '_>>;

    /// Change how long a write transaction waits for another writer before
    /// failing with `Contention`
    fn set_busy_timeout(&self, timeout: Duration) -> StorageResult<()>;
}

/// An open transaction. Dropping it without `commit` rolls back.
pub trait StoreTransaction {
    // === Books ===

    fn book_exists(&self, book: BookId) -> StorageResult<bool>;

    /// Insert a book; returns false if the id is already registered
    fn insert_book(&self, book: &Book) -> StorageResult<bool>;

    /// Add editorial weight to a (book, tag) counter, creating the row if
    /// needed. Only used during book ingestion.
    fn seed_counter(&self, book: BookId, tag: TagId, base_count: u64) -> StorageResult<()>;

    // === Tag directory ===

    fn load_tag(&self, id: TagId) -> StorageResult<Option<Tag>>;

    fn find_tag_by_key(&self, key: &str) -> StorageResult<Option<Tag>>;

    /// Insert an Active tag under `key` unless one already exists.
    ///
    /// Returns the row stored under `key` and whether this call created it.
    fn insert_tag_if_absent(&self, name: &str, key: &str) -> StorageResult<(Tag, bool)>;

    /// Overwrite a tag's status; returns false if the tag does not exist
    fn set_tag_status(&self, id: TagId, status: TagStatus) -> StorageResult<bool>;

    /// All tags currently in Merged status
    fn merged_tags(&self) -> StorageResult<Vec<Tag>>;

    // === Attributions ===

    /// Tags the user currently attributes to the book
    fn attributed_tags(&self, user: UserId, book: BookId) -> StorageResult<BTreeSet<TagId>>;

    /// Insert an attribution; returns false if it already existed
    fn insert_attribution(&self, attribution: &Attribution) -> StorageResult<bool>;

    /// Delete an attribution; returns false if it was absent
    fn delete_attribution(&self, user: UserId, book: BookId, tag: TagId) -> StorageResult<bool>;

    /// Distinct users attributing any of `tags` to `book`
    fn count_book_users(&self, book: BookId, tags: &[TagId]) -> StorageResult<u64>;

    /// Distinct (user, book) pairs attributing any of `tags`
    fn count_user_books(&self, tags: &[TagId]) -> StorageResult<u64>;

    // === Counters ===

    /// Atomically apply a delta to `user_count` and rewrite `tag_count`.
    ///
    /// An increment on a missing row creates it with base_count 0. A
    /// decrement never takes `user_count` below zero.
    fn apply_counter_delta(&self, book: BookId, tag: TagId, delta: Delta) -> StorageResult<DeltaOutcome>;

    /// Atomically apply a delta to a tag's `global_count`, floored at zero
    fn apply_global_delta(&self, tag: TagId, delta: Delta) -> StorageResult<DeltaOutcome>;

    fn read_counter(&self, book: BookId, tag: TagId) -> StorageResult<Option<BookTagCounter>>;

    /// All counter rows for a book
    fn book_counters(&self, book: BookId) -> StorageResult<Vec<BookTagCounter>>;

    // === Audit ===

    /// Every (book, tag) pair that has a counter row or an attribution
    fn counter_audit(&self) -> StorageResult<Vec<CounterAuditRow>>;

    /// Every tag with its global count and attribution count
    fn global_audit(&self) -> StorageResult<Vec<GlobalAuditRow>>;

    /// Make the transaction's writes durable
    fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: TagStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
