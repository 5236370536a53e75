//! Shared helpers for tagtally integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use tagtally::{
    Book, BookId, OpenStore, SeedTag, SqliteStore, TagEngine, TagId, TagRef, TagSubmission,
};
use tempfile::TempDir;

/// A database file inside a fresh temporary directory.
///
/// Keep the `TempDir` alive for as long as the file is in use.
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tagtally.db");
    (dir, path)
}

pub fn memory_engine() -> TagEngine {
    TagEngine::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
}

/// An engine with its own connection to the database at `path`
pub fn engine_at(path: &PathBuf) -> TagEngine {
    TagEngine::new(Arc::new(SqliteStore::open(path).unwrap()))
}

pub fn add_book(engine: &TagEngine, id: i64, seeds: &[(&str, u64)]) -> BookId {
    let seeds: Vec<SeedTag> = seeds
        .iter()
        .map(|(name, count)| SeedTag::new(*name, *count))
        .collect();
    let book = BookId::new(id);
    engine
        .register_book(Book::new(book, format!("Book {}", id)), &seeds)
        .unwrap();
    book
}

pub fn by_names(names: &[&str]) -> TagSubmission {
    names
        .iter()
        .fold(TagSubmission::new(), |s, name| s.with_tag_name(*name))
}

pub fn tag_id(engine: &TagEngine, name: &str) -> TagId {
    engine.resolve(&TagRef::from(name)).unwrap().unwrap().id
}

pub fn user_count(engine: &TagEngine, book: BookId, tag: TagId) -> u64 {
    engine
        .counter(book, tag)
        .unwrap()
        .map(|c| c.user_count)
        .unwrap_or(0)
}
