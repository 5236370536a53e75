//! TagEngine: the entry point for submitting and clearing tags

use super::reconciler;
use super::resolver::CanonicalResolver;
use super::submission::{AppliedTagSet, TagSubmission};
use crate::config::EngineConfig;
use crate::model::{Book, BookId, BookTagCounter, SeedTag, Tag, TagId, TagRef, UserId};
use crate::storage::{StorageError, StoreTransaction, TagStore};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Largest base_count a counter row can hold
const MAX_BASE_COUNT: u64 = i64::MAX as u64;

/// How often a call waiting on a busy (user, book) pair retries the lock
const PAIR_LOCK_POLL: Duration = Duration::from_millis(1);

/// Stored state that violates an invariant the engine will not repair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityFault {
    #[error("merge chain starting at tag {start} loops back to tag {repeated}")]
    MergeCycle { start: TagId, repeated: TagId },

    #[error("merge chain starting at tag {start} exceeds {max_hops} hops")]
    HopLimitExceeded { start: TagId, max_hops: usize },

    #[error("tag {alias} is merged into tag {target}, which does not exist")]
    MissingCanonical { alias: TagId, target: TagId },

    #[error("tag {0} is referenced but has no directory row")]
    MissingTag(TagId),
}

/// Errors that can occur in tagging operations
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    #[error("Tag not found: {0}")]
    TagNotFound(TagId),

    #[error("Integrity fault: {0}")]
    Integrity(#[from] IntegrityFault),

    /// Another writer held the lock past the busy timeout
    #[error("Contention: {0}")]
    Contention(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for TagError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Contention(msg) => TagError::Contention(msg),
            other => TagError::Storage(other),
        }
    }
}

impl TagError {
    /// Only contention is worth retrying: every call re-reads state first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TagError::Contention(_))
    }
}

/// Result type for tagging operations
pub type TagResult<T> = Result<T, TagError>;

/// Log an integrity fault and turn it into the error that halts the call
pub(crate) fn fault(f: IntegrityFault) -> TagError {
    tracing::error!(fault = %f, "integrity fault");
    TagError::Integrity(f)
}

/// The tagging engine
///
/// Owns the canonical resolver and serializes calls per (user, book) so the
/// diff in one call always observes the previous call's committed state.
/// Calls on different pairs proceed independently.
pub struct TagEngine {
    store: Arc<dyn TagStore>,
    resolver: CanonicalResolver,
    config: EngineConfig,
    pair_locks: DashMap<(UserId, BookId), Arc<Mutex<()>>>,
}

impl TagEngine {
    /// Create an engine with default configuration.
    ///
    /// The store keeps whatever busy timeout it was opened with.
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        Self::build(store, EngineConfig::default())
    }

    /// Create an engine and apply `config.busy_timeout_ms` to the store
    pub fn with_config(store: Arc<dyn TagStore>, config: EngineConfig) -> TagResult<Self> {
        store.set_busy_timeout(config.busy_timeout())?;
        Ok(Self::build(store, config))
    }

    fn build(store: Arc<dyn TagStore>, config: EngineConfig) -> Self {
        Self {
            store,
            resolver: CanonicalResolver::new(config.max_resolve_hops),
            config,
            pair_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn TagStore {
        self.store.as_ref()
    }

    pub(crate) fn resolver(&self) -> &CanonicalResolver {
        &self.resolver
    }

    // --- Ingestion ---

    /// Register a book and its editorial tag weights.
    ///
    /// Seeds are resolved by name; seeds landing on the same canonical tag
    /// add up and blocked seeds are skipped. Returns the seeded counters.
    pub fn register_book(&self, book: Book, seeds: &[SeedTag]) -> TagResult<Vec<BookTagCounter>> {
        if book.title.trim().is_empty() {
            return Err(TagError::Validation("book title must not be blank".into()));
        }
        for seed in seeds {
            self.check_name_len(&seed.name)?;
            check_base_count(&seed.name, seed.base_count)?;
        }

        let tx = self.store.begin_write()?;
        if !tx.insert_book(&book)? {
            return Err(TagError::Validation(format!(
                "book {} is already registered",
                book.id
            )));
        }

        let mut weights: BTreeMap<TagId, u64> = BTreeMap::new();
        for seed in seeds {
            let tag_ref = TagRef::ByName(seed.name.clone());
            let Some(tag) = self.resolver.resolve(tx.as_ref(), &tag_ref)? else {
                tracing::info!(book = %book.id, seed = %seed.name, "seed tag has no active canonical, skipped");
                continue;
            };
            let weight = weights.entry(tag.id).or_default();
            *weight = weight
                .checked_add(seed.base_count)
                .unwrap_or(u64::MAX);
            check_base_count(&tag.name, *weight)?;
        }

        let mut counters = Vec::with_capacity(weights.len());
        for (tag, base_count) in weights {
            tx.seed_counter(book.id, tag, base_count)?;
            if let Some(counter) = tx.read_counter(book.id, tag)? {
                counters.push(counter);
            }
        }
        tx.commit()?;

        tracing::info!(book = %book.id, seeds = counters.len(), "registered book");
        Ok(counters)
    }

    // --- Write ---

    /// Replace the user's tags on a book with the submitted selection.
    pub fn submit_tags(
        &self,
        user: UserId,
        book: BookId,
        submission: &TagSubmission,
    ) -> TagResult<AppliedTagSet> {
        let refs = submission.to_refs(&self.config)?;
        self.apply(user, book, &refs)
    }

    /// Remove every tag the user attributes to the book.
    pub fn clear_tags(&self, user: UserId, book: BookId) -> TagResult<AppliedTagSet> {
        self.apply(user, book, &[])
    }

    fn apply(&self, user: UserId, book: BookId, refs: &[TagRef]) -> TagResult<AppliedTagSet> {
        self.with_pair_lock(user, book, || {
            let tx = self.store.begin_write()?;
            if !tx.book_exists(book)? {
                return Err(TagError::BookNotFound(book));
            }

            // Any resolver failure returns here; dropping the transaction
            // discards tags it created lazily.
            let resolved = self.resolver.resolve_batch(tx.as_ref(), refs)?;
            let wanted: BTreeSet<TagId> = resolved.iter().map(|t| t.id).collect();

            let outcome = reconciler::reconcile(tx.as_ref(), user, book, &wanted)?;
            let tags = reload(tx.as_ref(), &wanted)?;
            tx.commit()?;

            if !outcome.is_noop() {
                tracing::debug!(
                    user = %user,
                    book = %book,
                    added = outcome.added.len(),
                    removed = outcome.removed.len(),
                    "reconciled tags"
                );
            }

            Ok(AppliedTagSet {
                user,
                book,
                tags,
                added: outcome.added,
                removed: outcome.removed,
                warnings: outcome.warnings,
            })
        })
    }

    /// Run `f` while holding the lock for (user, book).
    ///
    /// Waits at most the configured busy timeout for another call on the
    /// same pair, then fails with `Contention`.
    fn with_pair_lock<T>(
        &self,
        user: UserId,
        book: BookId,
        f: impl FnOnce() -> TagResult<T>,
    ) -> TagResult<T> {
        let key = (user, book);
        // The map's shard guard is released at the end of this statement.
        let lock = Arc::clone(
            &self
                .pair_locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );

        let deadline = Instant::now() + self.config.busy_timeout();
        let result = loop {
            match lock.try_lock() {
                Ok(_guard) => break f(),
                // A panicking holder left no open transaction behind.
                Err(TryLockError::Poisoned(poisoned)) => {
                    let _guard = poisoned.into_inner();
                    break f();
                }
                Err(TryLockError::WouldBlock) if Instant::now() >= deadline => {
                    break Err(TagError::Contention(format!(
                        "user {} book {} is busy in another call",
                        user, book
                    )));
                }
                Err(TryLockError::WouldBlock) => std::thread::sleep(PAIR_LOCK_POLL),
            }
        };

        drop(lock);
        self.pair_locks
            .remove_if(&key, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    // --- Read ---

    /// Tags the user currently attributes to the book, by name
    pub fn attributed_tags(&self, user: UserId, book: BookId) -> TagResult<Vec<Tag>> {
        let tx = self.store.begin_read()?;
        if !tx.book_exists(book)? {
            return Err(TagError::BookNotFound(book));
        }
        let ids = tx.attributed_tags(user, book)?;
        reload(tx.as_ref(), &ids)
    }

    /// Resolve a reference to its effective tag, creating it when an
    /// unseen name is given.
    pub fn resolve(&self, tag_ref: &TagRef) -> TagResult<Option<Tag>> {
        if let TagRef::ByName(name) = tag_ref {
            self.check_name_len(name)?;
        }
        let tx = self.store.begin_write()?;
        let tag = self.resolver.resolve(tx.as_ref(), tag_ref)?;
        tx.commit()?;
        Ok(tag)
    }

    /// Load a tag row as stored, without following merges
    pub fn tag(&self, id: TagId) -> TagResult<Tag> {
        let tx = self.store.begin_read()?;
        tx.load_tag(id)?.ok_or(TagError::TagNotFound(id))
    }

    /// Current counters for a (book, tag) row, as stored
    pub fn counter(&self, book: BookId, tag: TagId) -> TagResult<Option<BookTagCounter>> {
        let tx = self.store.begin_read()?;
        super::counters::read_current(tx.as_ref(), book, tag)
    }

    pub(crate) fn check_name_len(&self, name: &str) -> TagResult<()> {
        let len = crate::model::display_name(name).chars().count();
        if len > self.config.max_tag_name_len {
            return Err(TagError::Validation(format!(
                "tag name is {} characters, limit is {}",
                len, self.config.max_tag_name_len
            )));
        }
        Ok(())
    }
}

fn check_base_count(name: &str, base_count: u64) -> TagResult<()> {
    if base_count > MAX_BASE_COUNT {
        return Err(TagError::Validation(format!(
            "seed weight for '{}' exceeds {}",
            name, MAX_BASE_COUNT
        )));
    }
    Ok(())
}

/// Load tags by id inside a transaction, ordered by normalized name
fn reload(tx: &dyn StoreTransaction, ids: &BTreeSet<TagId>) -> TagResult<Vec<Tag>> {
    let mut tags = Vec::with_capacity(ids.len());
    for id in ids {
        let tag = tx.load_tag(*id)?.ok_or_else(|| fault(IntegrityFault::MissingTag(*id)))?;
        tags.push(tag);
    }
    tags.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| a.name.cmp(&b.name))
            .then(a.id.cmp(&b.id))
    });
    Ok(tags)
}
