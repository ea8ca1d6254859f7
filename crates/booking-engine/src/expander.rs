//! Calendar events → blocking intervals.
//!
//! One-off events block their own extent. Recurring events are expanded with
//! the `rrule` crate using the event's TZID, so occurrences keep their local
//! wall-clock time across DST transitions. All-day events block whole local
//! days in the event's timezone.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::dst;
use crate::error::{BookingError, Result};
use crate::interval::{BlockingInterval, Interval};
use crate::model::CalendarEvent;

/// Cap on occurrences expanded per event and window.
const MAX_OCCURRENCES: u16 = 1000;

/// Blocking intervals contributed by `event` that overlap `window`.
///
/// # Errors
/// Returns `BookingError::InvalidRecurrence` if the event's RRULE is unparseable.
pub fn event_blocking_intervals(
    event: &CalendarEvent,
    window: Interval,
) -> Result<Vec<BlockingInterval>> {
    let length = event.end - event.start;
    if length <= Duration::zero() && !event.is_all_day {
        return Ok(Vec::new());
    }

    let occurrences = match event.recurrence_rule.as_deref() {
        Some(rule) if !rule.trim().is_empty() => {
            // Look back far enough to catch an occurrence already in progress.
            let lookback = length.max(Duration::days(1));
            expand_occurrences(
                rule,
                event.start,
                event.timezone,
                window.start - lookback,
                window.end,
            )?
        }
        _ => vec![event.start],
    };

    let mut blocks: Vec<BlockingInterval> = occurrences
        .into_iter()
        .filter_map(|start| {
            let occurrence = Interval::new(start, start + length);
            if event.is_all_day {
                all_day_extent(event.timezone, occurrence)
            } else {
                Some(occurrence)
            }
        })
        .filter(|block| block.overlaps(&window))
        .collect();

    blocks.sort();
    blocks.dedup();
    Ok(blocks)
}

/// Blocking intervals from all `events`, sorted by start.
pub fn events_blocking_intervals(
    events: &[CalendarEvent],
    window: Interval,
) -> Result<Vec<BlockingInterval>> {
    let mut blocks = Vec::new();
    for event in events {
        blocks.extend(event_blocking_intervals(event, window)?);
    }
    blocks.sort();
    Ok(blocks)
}

/// Check that `event`'s RRULE parses, so a bad rule is refused on write
/// rather than failing every later availability query.
///
/// # Errors
/// Returns `BookingError::InvalidRecurrence` if the rule is unparseable.
pub fn validate_recurrence(event: &CalendarEvent) -> Result<()> {
    match event.recurrence_rule.as_deref() {
        Some(rule) if !rule.trim().is_empty() => {
            rrule_set(rule, event.start, event.timezone).map(|_| ())
        }
        _ => Ok(()),
    }
}

/// Widen an occurrence to the local days it touches.
///
/// An end at exactly local midnight does not claim the following day.
fn all_day_extent(tz: Tz, occurrence: Interval) -> Option<Interval> {
    let first: NaiveDate = dst::local_date(tz, occurrence.start);
    let end_local = occurrence.end.with_timezone(&tz);
    let mut last = end_local.date_naive();
    if last > first && end_local.time() == chrono::NaiveTime::MIN {
        last = last.pred_opt()?;
    }
    let start = dst::local_day_bounds(tz, first)?.start;
    let end = dst::local_day_bounds(tz, last)?.end;
    Some(Interval::new(start, end))
}

/// Expand the RRULE body `rule` anchored at `dtstart` into occurrence starts in `[after, before]`.
fn expand_occurrences(
    rule: &str,
    dtstart: DateTime<Utc>,
    tz: Tz,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let set = rrule_set(rule, dtstart, tz)?;

    let after = after.max(dtstart) - Duration::seconds(1);
    let instances = set
        .after(after.with_timezone(&rrule::Tz::UTC))
        .before(before.with_timezone(&rrule::Tz::UTC))
        .all(MAX_OCCURRENCES);

    if instances.limited {
        tracing::warn!(
            rule,
            limit = MAX_OCCURRENCES,
            "recurrence expansion truncated"
        );
    }

    Ok(instances
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc))
        .collect())
}

fn rrule_set(rule: &str, dtstart: DateTime<Utc>, tz: Tz) -> Result<RRuleSet> {
    // DTSTART carries the local wall-clock time so the rrule crate applies
    // the zone's offset per occurrence.
    let local_start = dtstart.with_timezone(&tz).format("%Y%m%dT%H%M%S");
    let rrule_text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        tz.name(),
        local_start,
        rule.trim()
    );

    rrule_text
        .parse()
        .map_err(|e| BookingError::InvalidRecurrence(format!("{}: {}", rule.trim(), e)))
}
