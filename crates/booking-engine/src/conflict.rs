//! Remove candidate slots that collide with busy time.
//!
//! A slot `[s, e)` collides with a blocking interval `[b.start, b.end)` when
//! `s < b.end + buffer && e > b.start - buffer`: hard overlap, or starting
//! less than `buffer` after a busy period, or ending less than `buffer` before
//! one. A slot that ends exactly `buffer` before a booking is still free.

use chrono::Duration;

use crate::interval::{merge_intervals, BlockingInterval, CandidateSlot, Interval};

/// Busy time padded by the buffer and merged, ready for repeated lookups.
#[derive(Debug, Clone, Default)]
pub struct BusyIndex {
    padded: Vec<Interval>,
}

impl BusyIndex {
    pub fn new(busy: &[BlockingInterval], buffer: Duration) -> Self {
        let padded: Vec<Interval> = busy.iter().map(|b| b.padded(buffer)).collect();
        Self {
            padded: merge_intervals(&padded),
        }
    }

    /// True when `slot` clears every padded busy interval.
    pub fn is_free(&self, slot: &CandidateSlot) -> bool {
        // Merged intervals are disjoint, so ends are sorted too.
        let idx = self.padded.partition_point(|b| b.end <= slot.start);
        match self.padded.get(idx) {
            Some(b) => !slot.overlaps(b),
            None => true,
        }
    }
}

/// Keep the candidates that clear all busy intervals including the buffer margin.
///
/// Order of the input is preserved.
pub fn filter_available<I>(
    candidates: I,
    busy: &[BlockingInterval],
    buffer: Duration,
) -> Vec<CandidateSlot>
where
    I: IntoIterator<Item = CandidateSlot>,
{
    let index = BusyIndex::new(busy, buffer);
    candidates
        .into_iter()
        .filter(|slot| index.is_free(slot))
        .collect()
}

/// Single-slot form of [`filter_available`].
pub fn is_slot_free(slot: &CandidateSlot, busy: &[BlockingInterval], buffer: Duration) -> bool {
    conflicting_intervals(slot, busy, buffer).is_empty()
}

/// Every busy interval that blocks `slot` once padded by `buffer`.
pub fn conflicting_intervals(
    slot: &CandidateSlot,
    busy: &[BlockingInterval],
    buffer: Duration,
) -> Vec<BlockingInterval> {
    busy.iter()
        .filter(|b| slot.overlaps(&b.padded(buffer)))
        .copied()
        .collect()
}
