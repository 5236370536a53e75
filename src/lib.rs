//! tagtally: user tag attribution and aggregation for a book catalog
//!
//! Users attach free-text tags to books. Names are normalized into a shared
//! tag directory, where moderators can block tags or merge aliases into a
//! canonical tag. Per-book counters combine editorial seed weights with a
//! live count of users, and every change is applied as a diff against what
//! the user attributed before.
//!
//! # Core Concepts
//!
//! - **Tags**: directory entries that are Active, Blocked, or Merged into another tag
//! - **Attributions**: one user tagging one book with one canonical tag
//! - **Counters**: `tag_count = base_count + user_count` per (book, tag)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tagtally::{Book, BookId, OpenStore, SqliteStore, TagEngine, TagSubmission, UserId};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let engine = TagEngine::new(Arc::new(store));
//! engine.register_book(Book::new(BookId::new(1), "Demian"), &[]).unwrap();
//!
//! let applied = engine
//!     .submit_tags(UserId::new(7), BookId::new(1), &TagSubmission::new().with_tag_name("growth"))
//!     .unwrap();
//! assert_eq!(applied.tags[0].name, "growth");
//! ```

pub mod config;
pub mod model;
pub mod query;
pub mod storage;
pub mod tagging;

pub use config::{ConfigError, EngineConfig};
pub use model::{
    Attribution, Book, BookId, BookTagCounter, SeedTag, Tag, TagId, TagRef, TagStatus, UserId,
};
pub use query::{CounterAudit, RankedTag, TagUsage, TopTagsResult};
pub use storage::{OpenStore, SqliteStore, StorageError, StorageResult, TagStore};
pub use tagging::{
    AppliedTagSet, IntegrityFault, IntegrityWarning, TagEngine, TagError, TagResult,
    TagSubmission,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
