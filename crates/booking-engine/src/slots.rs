//! Slot generation: weekly availability rules → ordered candidate slots.
//!
//! Rules are merged per weekday, converted to UTC one local date at a time
//! (via [`crate::dst`]), and cut into fixed-length slots spaced by
//! `duration + buffer`. Generation is lazy and a pure function of its inputs:
//! cloning a [`SlotIter`] before use and draining both yields identical
//! sequences.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::dst::{self, DstPolicy};
use crate::error::{BookingError, Result};
use crate::interval::{merge_intervals, CandidateSlot, Interval};
use crate::model::AvailabilityRule;

/// Inputs to [`generate_slots`] other than the rules themselves.
#[derive(Debug, Clone)]
pub struct SlotParams {
    pub duration_minutes: u32,
    pub buffer_minutes: u32,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub organizer_tz: Tz,
    /// Slots starting before this instant are discarded (now minus skew tolerance).
    pub not_before: DateTime<Utc>,
    pub dst_policy: DstPolicy,
}

/// Availability rules merged into non-overlapping local windows per weekday.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklySchedule {
    days: [Vec<(NaiveTime, NaiveTime)>; 7],
}

impl WeeklySchedule {
    /// Validate and merge `rules` for an organizer in `organizer_tz`.
    ///
    /// Overlapping or touching windows on the same weekday are coalesced so the
    /// slot grid runs continuously across the seam.
    pub fn from_rules(rules: &[AvailabilityRule], organizer_tz: Tz) -> Result<Self> {
        let mut days: [Vec<(NaiveTime, NaiveTime)>; 7] = Default::default();

        for rule in rules {
            if rule.day_of_week > 6 {
                return Err(BookingError::InvalidRule(format!(
                    "day_of_week {} is outside 0-6",
                    rule.day_of_week
                )));
            }
            if rule.start_time >= rule.end_time {
                return Err(BookingError::InvalidRule(format!(
                    "window {}-{} does not end after it starts",
                    rule.start_time, rule.end_time
                )));
            }
            if let Some(tz) = rule.timezone {
                if tz != organizer_tz {
                    return Err(BookingError::InvalidRule(format!(
                        "rule timezone {} differs from organizer timezone {}",
                        tz, organizer_tz
                    )));
                }
            }
            days[rule.day_of_week as usize].push((rule.start_time, rule.end_time));
        }

        for windows in days.iter_mut() {
            windows.sort();
            let mut merged: Vec<(NaiveTime, NaiveTime)> = Vec::with_capacity(windows.len());
            for &(start, end) in windows.iter() {
                if let Some(last) = merged.last_mut() {
                    if start <= last.1 {
                        last.1 = last.1.max(end);
                        continue;
                    }
                }
                merged.push((start, end));
            }
            *windows = merged;
        }

        Ok(Self { days })
    }

    /// Merged local windows for a weekday (0 = Sunday).
    pub fn windows(&self, weekday: u8) -> &[(NaiveTime, NaiveTime)] {
        self.days
            .get(weekday as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }
}

/// Lazy, restartable iterator over candidate slots in ascending start order.
#[derive(Debug, Clone)]
pub struct SlotIter {
    schedule: WeeklySchedule,
    tz: Tz,
    duration: Duration,
    step: Duration,
    range: Interval,
    not_before: DateTime<Utc>,
    policy: DstPolicy,
    next_date: Option<NaiveDate>,
    last_date: NaiveDate,
    pending: VecDeque<CandidateSlot>,
}

impl SlotIter {
    fn new(schedule: WeeklySchedule, params: &SlotParams) -> Self {
        let tz = params.organizer_tz;
        Self {
            schedule,
            tz,
            duration: Duration::minutes(params.duration_minutes as i64),
            step: Duration::minutes(params.duration_minutes as i64 + params.buffer_minutes as i64),
            range: Interval::new(params.range_start, params.range_end),
            not_before: params.not_before,
            policy: params.dst_policy,
            next_date: Some(dst::local_date(tz, params.range_start)),
            last_date: dst::local_date(tz, params.range_end),
            pending: VecDeque::new(),
        }
    }

    /// Queue every slot for one local date.
    fn fill_day(&mut self, date: NaiveDate) {
        let weekday = dst::weekday_index(date);
        let windows: Vec<Interval> = self
            .schedule
            .windows(weekday)
            .iter()
            .filter_map(|&(start, end)| {
                dst::local_window_to_utc(self.tz, date, start, end, self.policy)
            })
            .collect();

        // Gap shifting can make neighbouring windows touch.
        for window in merge_intervals(&windows) {
            let mut start = window.start;
            while start + self.duration <= window.end {
                if start >= self.range.start && start < self.range.end && start >= self.not_before
                {
                    self.pending
                        .push_back(Interval::new(start, start + self.duration));
                }
                start += self.step;
            }
        }
    }
}

impl Iterator for SlotIter {
    type Item = CandidateSlot;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(slot) = self.pending.pop_front() {
                return Some(slot);
            }
            let date = self.next_date.filter(|d| *d <= self.last_date)?;
            self.next_date = date.succ_opt();
            self.fill_day(date);
        }
    }
}

/// Generate candidate slots for `rules` within `[range_start, range_end)`.
///
/// A slot is kept when its start lies inside the range and at or after
/// `not_before`; it may end past `range_end`. A rule window shorter than the
/// duration produces no slots.
///
/// # Errors
/// `InvalidConfig` for a zero duration, `InvalidRange` when the range is empty
/// or reversed, `InvalidRule` for malformed rules.
pub fn generate_slots(rules: &[AvailabilityRule], params: &SlotParams) -> Result<SlotIter> {
    if params.duration_minutes == 0 {
        return Err(BookingError::InvalidConfig(
            "duration must be greater than zero".to_string(),
        ));
    }
    if params.range_end <= params.range_start {
        return Err(BookingError::InvalidRange(format!(
            "range end {} is not after start {}",
            params.range_end, params.range_start
        )));
    }

    let schedule = WeeklySchedule::from_rules(rules, params.organizer_tz)?;
    Ok(SlotIter::new(schedule, params))
}
