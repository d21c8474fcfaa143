use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};

use crate::limits::SEARCH_WINDOW_MINUTES;
use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// The probe interval for an availability query: a fixed one-hour window
/// starting at the requested time, regardless of how long the existing
/// reservations run.
pub fn query_window(start: NaiveTime) -> Span {
    let s = minutes_of(start);
    Span::new(s, s + SEARCH_WINDOW_MINUTES)
}

/// Tally, per slot type, how many active reservations for the given
/// vehicle type and date overlap the query window. Cancelled reservations
/// and reservations on other dates never contribute.
pub fn overlap_counts(
    state: &LocationState,
    vehicle_type_id: u32,
    date: NaiveDate,
    window: &Span,
) -> HashMap<u32, u32> {
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for r in state.active_on(date, vehicle_type_id) {
        if r.span().overlaps(window) {
            *counts.entry(r.slot_type_id).or_insert(0) += 1;
        }
    }
    counts
}

/// Remaining capacity per catalog row for one (vehicle type, date, start)
/// probe. Returns `(catalog row, remaining)` pairs in catalog order.
/// Capacity is derived fresh from raw reservation rows on every call and
/// clamps at zero when overbooked.
pub fn remaining_slots(
    state: &LocationState,
    vehicle_type_id: u32,
    date: NaiveDate,
    start: NaiveTime,
) -> Vec<(PricingRow, u32)> {
    let window = query_window(start);
    let counts = overlap_counts(state, vehicle_type_id, date, &window);

    state
        .pricing
        .iter()
        .filter(|row| row.vehicle_type_id == vehicle_type_id)
        .map(|row| {
            let taken = counts.get(&row.slot_type_id).copied().unwrap_or(0);
            (row.clone(), row.available_slots.saturating_sub(taken))
        })
        .collect()
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Sweep-line algorithm: find time ranges where the occupancy count >= capacity.
/// Returns sorted, merged spans representing fully-saturated time ranges.
/// Callers must handle `capacity == 0` themselves (nothing can ever fit).
pub fn saturated_spans(occupied: &[Span], capacity: u32) -> Vec<Span> {
    if occupied.is_empty() || capacity == 0 {
        return Vec::new();
    }
    if capacity == 1 {
        let mut sorted = occupied.to_vec();
        sorted.sort_by_key(|s| s.start);
        return merge_overlapping(&sorted);
    }

    // Sweep-line events: +1 at start, -1 at end
    let mut events: Vec<(Minutes, i32)> = Vec::with_capacity(occupied.len() * 2);
    for s in occupied {
        events.push((s.start, 1));
        events.push((s.end, -1));
    }
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut result = Vec::new();
    let mut count: u32 = 0;
    let mut saturated_start: Option<Minutes> = None;

    for (time, delta) in &events {
        if *delta > 0 {
            count += *delta as u32;
        } else {
            count -= (-*delta) as u32;
        }

        if count >= capacity && saturated_start.is_none() {
            saturated_start = Some(*time);
        } else if count < capacity
            && let Some(start) = saturated_start.take()
            && *time > start {
                result.push(Span::new(start, *time));
            }
    }

    result
}
