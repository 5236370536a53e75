//! User tagging: resolution, reconciliation and counters
//!
//! Every mutation of a user's tags on a book goes through
//! [`TagEngine::submit_tags`] or [`TagEngine::clear_tags`], which resolve
//! the request to canonical tags and reconcile it against stored
//! attributions in a single write transaction.

mod counters;
mod engine;
mod moderation;
mod reconciler;
mod resolver;
mod submission;


pub use engine::{IntegrityFault, TagEngine, TagError, TagResult};
pub use reconciler::{CounterKind, IntegrityWarning, ReconcileOutcome};
pub use resolver::CanonicalResolver;
pub use submission::{AppliedTagSet, TagSubmission};
