//! Randomized operation sequences checked against the counter audit
//!
//! Seeds are fixed so failures reproduce.

mod common;

use common::{add_book, memory_engine, tag_id};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tagtally::{BookId, TagEngine, TagError, TagId, TagSubmission, UserId};

const NAMES: &[&str] = &[
    "warm-story", "Warm-Story", "growth", "grow", "family", "mystery", "spoiler", "  growth ",
];

fn random_submission(rng: &mut StdRng, known: &[TagId]) -> TagSubmission {
    let mut submission = TagSubmission::new();
    for _ in 0..rng.gen_range(0..4) {
        if let Some(name) = NAMES.choose(rng) {
            submission = submission.with_tag_name(*name);
        }
    }
    if rng.gen_bool(0.5) {
        if let Some(id) = known.choose(rng) {
            submission = submission.with_tag_id(*id);
        }
    }
    submission
}

fn moderate(engine: &TagEngine, rng: &mut StdRng, known: &[TagId]) {
    let (Some(a), Some(b)) = (known.choose(rng), known.choose(rng)) else {
        return;
    };
    let result = match rng.gen_range(0..3) {
        0 => engine.block_tag(*a),
        1 => engine.unblock_tag(*a),
        _ => engine.merge_tag(*a, *b),
    };
    if let Err(err) = result {
        assert!(matches!(err, TagError::Validation(_)), "unexpected error: {}", err);
    }
}

fn run_sequence(seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let engine = memory_engine();
    let books: Vec<BookId> = (1..=3)
        .map(|id| add_book(&engine, id, &[("family", id as u64 * 10)]))
        .collect();
    let known: Vec<TagId> = NAMES.iter().map(|name| tag_id(&engine, name)).collect();

    for _ in 0..steps {
        let user = UserId::new(rng.gen_range(1..=5));
        let book = books[rng.gen_range(0..books.len())];
        match rng.gen_range(0..10) {
            0 => {
                engine.clear_tags(user, book).unwrap();
            }
            1 => moderate(&engine, &mut rng, &known),
            _ => {
                let submission = random_submission(&mut rng, &known);
                engine.submit_tags(user, book, &submission).unwrap();
                // Resubmitting the same payload right away is a no-op.
                let again = engine.submit_tags(user, book, &submission).unwrap();
                assert!(!again.changed(), "resubmit changed counters (seed {})", seed);
            }
        }
    }

    let audit = engine.audit_counters().unwrap();
    assert!(audit.is_clean(), "seed {}: {:?}", seed, audit);

    for book in books {
        for counter_tag in &known {
            if let Some(counter) = engine.counter(book, *counter_tag).unwrap() {
                assert!(counter.is_consistent(), "seed {}: {:?}", seed, counter);
            }
        }
    }
}

#[test]
fn random_sequences_keep_counters_consistent() {
    for seed in 0..20 {
        run_sequence(seed, 150);
    }
}

#[test]
fn long_sequence_keeps_counters_consistent() {
    run_sequence(0x5eed, 1_000);
}
