//! Storage backends for tagtally
//!
//! All persistence goes through the `TagStore` trait. The primary
//! implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::{SqliteStore, DEFAULT_BUSY_TIMEOUT};
pub use traits::{
    CounterAuditRow, GlobalAuditRow, OpenStore, StorageError, StorageResult, StoreTransaction,
    TagStore,
};
