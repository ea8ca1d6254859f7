//! Half-open UTC intervals and busy-period merging.
//!
//! Every component downstream of slot generation works on [`Interval`]s in
//! UTC. Adjacent intervals (one ends exactly when the next starts) do not
//! overlap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` range of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A bookable slot produced by the generator.
pub type CandidateSlot = Interval;

/// Busy time: an event occurrence or a confirmed booking.
pub type BlockingInterval = Interval;

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Open-interval intersection: `a.start < b.end && a.end > b.start`.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Grow the interval by `margin` on both sides.
    pub fn padded(&self, margin: Duration) -> Interval {
        Interval {
            start: self.start - margin,
            end: self.end + margin,
        }
    }
}

/// Merge overlapping or adjacent intervals.
///
/// Returns a sorted, non-overlapping list. Empty intervals are dropped.
pub fn merge_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.iter().copied().filter(|i| !i.is_empty()).collect();
    if sorted.is_empty() {
        return Vec::new();
    }

    sorted.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }

    merged
}

/// Merge busy intervals, keeping only those that touch `window`.
///
/// Unlike [`merge_intervals`] this does not clip: a booking that starts before
/// the window still needs its full extent for buffer checks at the edge.
pub fn merge_busy_in_window(busy: &[Interval], window: Interval) -> Vec<Interval> {
    let relevant: Vec<Interval> = busy
        .iter()
        .copied()
        .filter(|b| b.start <= window.end && b.end >= window.start)
        .collect();
    merge_intervals(&relevant)
}
