//! Concurrent submissions against one book
//!
//! Run with: `cargo test --test concurrency`

mod common;

use common::{add_book, by_names, engine_at, memory_engine, tag_id, temp_db, user_count};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tagtally::{
    EngineConfig, OpenStore, SqliteStore, TagEngine, TagError, TagStore, TagSubmission, UserId,
};

const THREADS: i64 = 8;

#[test]
fn shared_engine_loses_no_increments() {
    let engine = Arc::new(memory_engine());
    let book = add_book(&engine, 1, &[("warm-story", 3)]);

    let handles: Vec<_> = (1..=THREADS)
        .map(|user| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine
                    .submit_tags(UserId::new(user), book, &by_names(&["warm-story"]))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let warm = tag_id(&engine, "warm-story");
    let counter = engine.counter(book, warm).unwrap().unwrap();
    assert_eq!(counter.user_count, THREADS as u64);
    assert_eq!(counter.tag_count, 3 + THREADS as u64);
    assert_eq!(engine.tag(warm).unwrap().global_count, THREADS as u64);
}

#[test]
fn same_pair_from_many_threads_stays_idempotent() {
    let engine = Arc::new(memory_engine());
    let book = add_book(&engine, 1, &[]);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine
                    .submit_tags(UserId::new(1), book, &by_names(&["growth", "family"]))
                    .unwrap()
            })
        })
        .collect();
    let added: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap().added.len())
        .sum();

    // Exactly one call saw an empty set; every later call was a no-op.
    assert_eq!(added, 2);
    assert_eq!(user_count(&engine, book, tag_id(&engine, "growth")), 1);
    assert!(engine.audit_counters().unwrap().is_clean());
}

#[test]
fn separate_connections_on_one_file_lose_no_deltas() {
    let (_dir, path) = temp_db();
    let setup = engine_at(&path);
    let book = add_book(&setup, 1, &[]);

    let handles: Vec<_> = (1..=THREADS)
        .map(|user| {
            let path = path.clone();
            thread::spawn(move || {
                let engine = engine_at(&path);
                let user = UserId::new(user);
                for round in 0..5 {
                    let names = if round % 2 == 0 {
                        vec!["growth", "family"]
                    } else {
                        vec!["growth", "mystery"]
                    };
                    engine.submit_tags(user, book, &by_names(&names)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Round 4 is the last one: every user ends on {growth, family}.
    assert_eq!(user_count(&setup, book, tag_id(&setup, "growth")), THREADS as u64);
    assert_eq!(user_count(&setup, book, tag_id(&setup, "family")), THREADS as u64);
    assert_eq!(user_count(&setup, book, tag_id(&setup, "mystery")), 0);
    assert!(setup.audit_counters().unwrap().is_clean());
}

#[test]
fn held_write_lock_yields_retryable_contention() {
    let (_dir, path) = temp_db();
    let holder_store = SqliteStore::open(&path).unwrap();
    let waiter_store = Arc::new(SqliteStore::open(&path).unwrap());
    waiter_store
        .set_busy_timeout(Duration::from_millis(50))
        .unwrap();
    let waiter = TagEngine::new(waiter_store);
    let book = add_book(&waiter, 1, &[]);

    let submission = TagSubmission::new().with_tag_name("growth");
    {
        let _held = holder_store.begin_write().unwrap();
        let err = waiter
            .submit_tags(UserId::new(1), book, &submission)
            .unwrap_err();
        assert!(matches!(err, TagError::Contention(_)));
        assert!(err.is_retryable());
    }

    // Lock released: the same call now goes through.
    let applied = waiter.submit_tags(UserId::new(1), book, &submission).unwrap();
    assert_eq!(applied.added.len(), 1);
}

#[test]
fn configured_busy_timeout_bounds_the_wait() {
    let (_dir, path) = temp_db();
    let holder_store = SqliteStore::open(&path).unwrap();
    let config = EngineConfig {
        busy_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let waiter =
        TagEngine::with_config(Arc::new(SqliteStore::open(&path).unwrap()), config).unwrap();
    let book = add_book(&waiter, 1, &[]);

    let _held = holder_store.begin_write().unwrap();
    let started = Instant::now();
    let err = waiter
        .submit_tags(UserId::new(1), book, &by_names(&["growth"]))
        .unwrap_err();

    // The store default would wait five seconds.
    assert!(matches!(err, TagError::Contention(_)));
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
}
