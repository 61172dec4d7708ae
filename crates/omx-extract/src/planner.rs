//! Partition planner
//!
//! Deterministically enumerates the daily partitions spanning
//! `[start_date, as_of]`. Pure; callers re-derive the same sequence on every
//! run and rely on checkpoints, not planner state, for resumability.

use crate::partition::Partition;
use chrono::{Duration, NaiveDate};

/// Enumerate the ordered, contiguous daily partitions for a source.
///
/// Each partition covers a single day (`range_start == range_end`). A start
/// date after `as_of` yields an empty plan, not an error.
pub fn plan_partitions(source_id: &str, start_date: NaiveDate, as_of: NaiveDate) -> Vec<Partition> {
    let mut partitions = Vec::new();
    let mut current = start_date;
    while current <= as_of {
        partitions.push(Partition::new(source_id, current, current));
        current = current + Duration::days(1);
    }
    partitions
}
