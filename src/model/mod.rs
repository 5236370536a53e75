//! Core data structures shared by storage, tagging and queries

mod book;
mod counter;
mod tag;

pub use book::{Attribution, Book, BookId, SeedTag, UserId};
pub use counter::{BookTagCounter, Delta, DeltaOutcome};
pub use tag::{display_name, normalize_name, Tag, TagId, TagRef, TagStatus};
