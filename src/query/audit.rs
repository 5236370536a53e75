//! Read-only consistency check of counters against attributions

use super::types::{CounterAudit, CounterMismatch, GlobalMismatch};
use crate::storage::StoreTransaction;
use crate::tagging::TagResult;

/// Compare every stored counter with the attribution rows behind it.
///
/// Reports only. Drift is never repaired here.
pub fn audit(tx: &dyn StoreTransaction) -> TagResult<CounterAudit> {
    let mut report = CounterAudit::default();

    for row in tx.counter_audit()? {
        report.counters_checked += 1;
        let (user_count, inconsistent_total) = match row.counter {
            Some(counter) => (Some(counter.user_count), !counter.is_consistent()),
            None => (None, false),
        };
        if user_count != Some(row.attributions) || inconsistent_total {
            report.counter_mismatches.push(CounterMismatch {
                book: row.book,
                tag: row.tag,
                user_count,
                attributions: row.attributions,
                inconsistent_total,
            });
        }
    }

    for row in tx.global_audit()? {
        report.tags_checked += 1;
        if row.global_count != row.attributions {
            report.global_mismatches.push(GlobalMismatch {
                tag: row.tag,
                global_count: row.global_count,
                attributions: row.attributions,
            });
        }
    }

    if !report.is_clean() {
        tracing::warn!(
            counters = report.counter_mismatches.len(),
            tags = report.global_mismatches.len(),
            "counter audit found drift"
        );
    }
    Ok(report)
}
