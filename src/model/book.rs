//! Books, users, and the attribution fact that links them to tags

use super::tag::TagId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Book identifier (ISBN-13 fits in an i64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(i64);

impl BookId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier, owned by the account service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimal book record; the catalog proper lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
}

impl Book {
    pub fn new(id: BookId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// Editorial weight attached to a book at ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTag {
    pub name: String,
    pub base_count: u64,
}

impl SeedTag {
    pub fn new(name: impl Into<String>, base_count: u64) -> Self {
        Self {
            name: name.into(),
            base_count,
        }
    }
}

/// One user currently tags one book with one tag.
///
/// Unique per (user, book, tag); created and destroyed, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub user: UserId,
    pub book: BookId,
    pub tag: TagId,
    pub created_at: DateTime<Utc>,
}

impl Attribution {
    pub fn new(user: UserId, book: BookId, tag: TagId) -> Self {
        Self {
            user,
            book,
            tag,
            created_at: Utc::now(),
        }
    }
}
