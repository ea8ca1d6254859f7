//! Local wall-clock to UTC conversion with DST transition policies.
//!
//! This is the only place local times become instants. Conversion always uses
//! the offset in force on the specific date, so a window that straddles a
//! transition maps to a UTC interval of its true length.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono::LocalResult;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;

/// Longest DST gap we scan across when shifting forward.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Policy for local times that fall in a DST gap (e.g. 02:30 during spring forward).
///
/// Ambiguous times (fall back) always resolve to the earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Drop the conversion entirely; windows touching the gap are skipped for that date.
    Skip,
    /// Use the first valid instant after the gap.
    #[default]
    ShiftForward,
}

/// Convert a local date and time-of-day in `tz` to a UTC instant.
///
/// Returns `None` only when the time falls in a DST gap and the policy is
/// [`DstPolicy::Skip`].
pub fn local_to_utc(
    tz: Tz,
    date: NaiveDate,
    time: NaiveTime,
    policy: DstPolicy,
) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => (1..=MAX_GAP_MINUTES).find_map(|m| {
                tz.from_local_datetime(&(naive + Duration::minutes(m)))
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
        },
    }
}

/// Convert a local `[start, end)` window on `date` to UTC.
///
/// Returns `None` when either bound is skipped by the policy or the converted
/// window is empty (it lay entirely inside a gap).
pub fn local_window_to_utc(
    tz: Tz,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    policy: DstPolicy,
) -> Option<Interval> {
    let start = local_to_utc(tz, date, start, policy)?;
    let end = local_to_utc(tz, date, end, policy)?;
    let window = Interval::new(start, end);
    (!window.is_empty()).then_some(window)
}

/// The UTC extent of a whole local calendar day.
///
/// 23 or 25 hours long on transition days.
pub fn local_day_bounds(tz: Tz, date: NaiveDate) -> Option<Interval> {
    let next = date.succ_opt()?;
    let start = local_to_utc(tz, date, NaiveTime::MIN, DstPolicy::ShiftForward)?;
    let end = local_to_utc(tz, next, NaiveTime::MIN, DstPolicy::ShiftForward)?;
    Some(Interval::new(start, end))
}

/// The local calendar date of `instant` in `tz`.
pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Weekday number used by availability rules: 0 = Sunday … 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}
