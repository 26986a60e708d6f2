//! Verdict evaluation
//!
//! Reduces the terminal records of a batch to the pass/fail verdict of the
//! enclosing build.

use scangate_core::domain::job::{JobRecord, JobState};

/// Returns `true` only if every record completed with a clean result
///
/// Any failed record, and any completed record with untriaged findings,
/// fails the batch. The result depends only on the multiset of records, so
/// repeated calls and reorderings agree. An empty batch passes.
pub fn evaluate(records: &[JobRecord]) -> bool {
    records.iter().all(is_clean)
}

/// Records that completed with untriaged findings
pub fn vulnerable(records: &[JobRecord]) -> impl Iterator<Item = &JobRecord> {
    records
        .iter()
        .filter(|r| r.state() == JobState::Complete && !is_clean(r))
}

/// Records that never reached a result
pub fn failed(records: &[JobRecord]) -> impl Iterator<Item = &JobRecord> {
    records.iter().filter(|r| r.state() == JobState::Failed)
}

fn is_clean(record: &JobRecord) -> bool {
    record.state() == JobState::Complete && record.result().is_some_and(|r| r.is_clean())
}
