use std::collections::BTreeSet;

use chrono::TimeDelta;

use crate::model::*;

use super::admission::within_gap;

// ── Availability Query ────────────────────────────────────────────

/// Tables that already hold a booking within `gap` of `candidate`.
///
/// Advisory only: the admission check re-runs at submission time and is the
/// authority. A table missing from this set can still be rejected later.
pub fn tables_conflicting_at(
    candidate: Timestamp,
    all_reservations: &[Reservation],
    gap: TimeDelta,
) -> BTreeSet<String> {
    all_reservations
        .iter()
        .filter(|r| within_gap(r.arrival_time, candidate, gap))
        .map(|r| r.table_id.clone())
        .collect()
}
