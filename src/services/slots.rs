use crate::models::availability::format_minutes;
use crate::models::{Booking, Conflict, OperatingWindow, Slot};

/// Half-open minute range [start, end) within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i32,
    pub end: i32,
}

impl Interval {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn of(booking: &Booking) -> Self {
        Self::new(booking.start_minute(), booking.end_minute())
    }

    /// Touching intervals (end == start) do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_minute(&self, minute: i32) -> bool {
        self.start <= minute && minute < self.end
    }
}

/// Enumerates step-aligned start times across `window` and annotates each
/// with the longest step multiple that fits before the next busy interval
/// or the window end, capped at `max_duration`.
///
/// Candidates inside a busy interval are dropped, as is a trailing partial
/// step when `step` does not divide the window.
pub fn compute_slots(
    window: &OperatingWindow,
    step: i32,
    max_duration: i32,
    busy: &[Interval],
) -> Vec<Slot> {
    if step <= 0 {
        return Vec::new();
    }

    let window_end = window.end_minute();
    let cap = (max_duration / step) * step;
    let mut slots = Vec::new();

    let mut t = window.start_minute();
    while t.checked_add(step).is_some_and(|end| end <= window_end) {
        if !busy.iter().any(|b| b.contains_minute(t)) {
            let limit = busy
                .iter()
                .filter(|b| b.start >= t)
                .map(|b| b.start)
                .min()
                .unwrap_or(window_end)
                .min(window_end);
            let fit = ((limit - t) / step) * step;
            let max_duration_minutes = fit.min(cap);
            if max_duration_minutes >= step {
                slots.push(Slot {
                    time: format_minutes(t),
                    max_duration_minutes,
                });
            }
        }
        t += step;
    }

    slots
}

/// Live bookings whose interval overlaps `proposed`, skipping `exclude_id`
/// (the booking being extended).
pub fn find_conflicts(
    proposed: &Interval,
    existing: &[(Booking, String)],
    exclude_id: Option<&str>,
) -> Vec<Conflict> {
    existing
        .iter()
        .filter(|(b, _)| b.blocks_interval())
        .filter(|(b, _)| exclude_id != Some(b.id.as_str()))
        .filter(|(b, _)| Interval::of(b).overlaps(proposed))
        .map(|(b, owner)| Conflict {
            booking_id: b.id.clone(),
            user: owner.clone(),
            time_start: format_minutes(b.start_minute()),
            time_end: format_minutes(b.end_minute()),
        })
        .collect()
}
