//! Tests for slot generation: grid spacing, rule merging, range filtering
//! and DST-correct conversion.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use booking_engine::dst::DstPolicy;
use booking_engine::slots::{generate_slots, SlotParams, WeeklySchedule};
use booking_engine::{AvailabilityRule, BookingError, CandidateSlot, Interval};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn rule(day: u8, start: (u32, u32), end: (u32, u32)) -> AvailabilityRule {
    AvailabilityRule::new(Uuid::nil(), day, time(start.0, start.1), time(end.0, end.1))
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn slot(start: DateTime<Utc>, end: DateTime<Utc>) -> CandidateSlot {
    Interval::new(start, end)
}

fn params(
    duration: u32,
    buffer: u32,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    tz: Tz,
) -> SlotParams {
    SlotParams {
        duration_minutes: duration,
        buffer_minutes: buffer,
        range_start,
        range_end,
        organizer_tz: tz,
        not_before: utc(2000, 1, 1, 0, 0),
        dst_policy: DstPolicy::ShiftForward,
    }
}

fn slots(rules: &[AvailabilityRule], p: &SlotParams) -> Vec<CandidateSlot> {
    generate_slots(rules, p).unwrap().collect()
}

// ── Grid ────────────────────────────────────────────────────────────────────

#[test]
fn monday_morning_thirty_minutes_with_fifteen_buffer() {
    // Mon 09:00-12:00 UTC, duration 30, buffer 15.
    // 11:45-12:15 would overrun the window and is not offered.
    let rules = vec![rule(1, (9, 0), (12, 0))];
    let p = params(30, 15, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let got = slots(&rules, &p);

    assert_eq!(
        got,
        vec![
            slot(utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 9, 30)),
            slot(utc(2026, 3, 2, 9, 45), utc(2026, 3, 2, 10, 15)),
            slot(utc(2026, 3, 2, 10, 30), utc(2026, 3, 2, 11, 0)),
            slot(utc(2026, 3, 2, 11, 15), utc(2026, 3, 2, 11, 45)),
        ]
    );
}

#[test]
fn window_shorter_than_duration_yields_nothing() {
    let rules = vec![rule(1, (9, 0), (9, 20))];
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    assert!(slots(&rules, &p).is_empty());
}

#[test]
fn window_exactly_one_duration_yields_one_slot() {
    let rules = vec![rule(1, (9, 0), (9, 30))];
    let p = params(30, 15, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    assert_eq!(
        slots(&rules, &p),
        vec![slot(utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 9, 30))]
    );
}

#[test]
fn other_weekdays_produce_no_slots() {
    // Tuesday rule, Monday-only range.
    let rules = vec![rule(2, (9, 0), (12, 0))];
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    assert!(slots(&rules, &p).is_empty());
}

#[test]
fn slots_are_ordered_across_days() {
    // Rules listed out of order; output must still be ascending globally.
    let rules = vec![
        rule(3, (9, 0), (10, 0)),
        rule(1, (14, 0), (15, 0)),
        rule(1, (9, 0), (10, 0)),
    ];
    let p = params(60, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 5, 0, 0), Tz::UTC);

    let got = slots(&rules, &p);

    assert_eq!(
        got,
        vec![
            slot(utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0)),
            slot(utc(2026, 3, 2, 14, 0), utc(2026, 3, 2, 15, 0)),
            slot(utc(2026, 3, 4, 9, 0), utc(2026, 3, 4, 10, 0)),
        ]
    );
}

// ── Rule merging ────────────────────────────────────────────────────────────

#[test]
fn overlapping_rules_are_merged_before_slotting() {
    // 09:00-10:30 and 10:00-11:00 → one 09:00-11:00 window.
    // Unmerged, 10:00-10:30 would be produced twice.
    let rules = vec![rule(1, (9, 0), (10, 30)), rule(1, (10, 0), (11, 0))];
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let got = slots(&rules, &p);

    assert_eq!(got.len(), 4);
    assert_eq!(got[0].start, utc(2026, 3, 2, 9, 0));
    assert_eq!(got[3].end, utc(2026, 3, 2, 11, 0));
}

#[test]
fn touching_rules_keep_buffer_spacing_across_the_seam() {
    // 09:00-10:00 + 10:00-11:00 with duration 30, buffer 15.
    // Merged grid: 09:00, 09:45, 10:30. Unmerged it would restart at 10:00.
    let rules = vec![rule(1, (9, 0), (10, 0)), rule(1, (10, 0), (11, 0))];
    let p = params(30, 15, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let starts: Vec<_> = slots(&rules, &p).into_iter().map(|s| s.start).collect();

    assert_eq!(
        starts,
        vec![
            utc(2026, 3, 2, 9, 0),
            utc(2026, 3, 2, 9, 45),
            utc(2026, 3, 2, 10, 30),
        ]
    );
}

#[test]
fn weekly_schedule_merges_per_weekday() {
    let rules = vec![
        rule(1, (13, 0), (14, 0)),
        rule(1, (9, 0), (10, 0)),
        rule(1, (9, 30), (11, 0)),
        rule(5, (9, 0), (10, 0)),
    ];

    let schedule = WeeklySchedule::from_rules(&rules, Tz::UTC).unwrap();

    assert_eq!(
        schedule.windows(1),
        &[(time(9, 0), time(11, 0)), (time(13, 0), time(14, 0))]
    );
    assert_eq!(schedule.windows(5), &[(time(9, 0), time(10, 0))]);
    assert!(schedule.windows(0).is_empty());
}

// ── Range and "now" filtering ───────────────────────────────────────────────

#[test]
fn slots_starting_before_range_start_are_dropped() {
    let rules = vec![rule(1, (9, 0), (12, 0))];
    let p = params(30, 15, utc(2026, 3, 2, 10, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let starts: Vec<_> = slots(&rules, &p).into_iter().map(|s| s.start).collect();

    // The grid stays anchored at the window start, it is not re-based on the range.
    assert_eq!(starts, vec![utc(2026, 3, 2, 10, 30), utc(2026, 3, 2, 11, 15)]);
}

#[test]
fn slot_starting_inside_range_may_end_after_it() {
    let rules = vec![rule(1, (9, 0), (12, 0))];
    let p = params(30, 15, utc(2026, 3, 2, 0, 0), utc(2026, 3, 2, 9, 50), Tz::UTC);

    let got = slots(&rules, &p);

    assert_eq!(
        got,
        vec![
            slot(utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 9, 30)),
            slot(utc(2026, 3, 2, 9, 45), utc(2026, 3, 2, 10, 15)),
        ]
    );
}

#[test]
fn slots_in_the_past_are_dropped() {
    let rules = vec![rule(1, (9, 0), (12, 0))];
    let mut p = params(30, 15, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);
    p.not_before = utc(2026, 3, 2, 9, 45);

    let starts: Vec<_> = slots(&rules, &p).into_iter().map(|s| s.start).collect();

    // A slot starting exactly at "now" is still offered.
    assert_eq!(
        starts,
        vec![
            utc(2026, 3, 2, 9, 45),
            utc(2026, 3, 2, 10, 30),
            utc(2026, 3, 2, 11, 15),
        ]
    );
}

#[test]
fn partial_boundary_days_in_organizer_timezone_are_included() {
    // Organizer in Tokyo (UTC+9). Monday 09:00 JST = Monday 00:00 UTC.
    // The range starts Sunday 20:00 UTC, which is already Monday in Tokyo.
    let tz: Tz = "Asia/Tokyo".parse().unwrap();
    let rules = vec![rule(1, (9, 0), (10, 0))];
    let p = params(60, 0, utc(2026, 3, 1, 20, 0), utc(2026, 3, 2, 1, 0), tz);

    assert_eq!(
        slots(&rules, &p),
        vec![slot(utc(2026, 3, 2, 0, 0), utc(2026, 3, 2, 1, 0))]
    );
}

// ── DST ─────────────────────────────────────────────────────────────────────

#[test]
fn spring_forward_window_uses_true_utc_length() {
    // 2026-03-08 (Sunday) in New York: 02:00 EST jumps to 03:00 EDT.
    // Local 01:00-04:00 is 06:00-08:00 UTC: two hours, not three.
    let tz: Tz = "America/New_York".parse().unwrap();
    let rules = vec![rule(0, (1, 0), (4, 0))];
    let p = params(60, 0, utc(2026, 3, 8, 0, 0), utc(2026, 3, 9, 0, 0), tz);

    let got = slots(&rules, &p);

    assert_eq!(
        got,
        vec![
            slot(utc(2026, 3, 8, 6, 0), utc(2026, 3, 8, 7, 0)),
            slot(utc(2026, 3, 8, 7, 0), utc(2026, 3, 8, 8, 0)),
        ]
    );
}

#[test]
fn fall_back_window_uses_true_utc_length() {
    // 2026-11-01 (Sunday) in New York: 02:00 EDT falls back to 01:00 EST.
    // Local 00:00-03:00 is 04:00-08:00 UTC: four hours.
    let tz: Tz = "America/New_York".parse().unwrap();
    let rules = vec![rule(0, (0, 0), (3, 0))];
    let p = params(60, 0, utc(2026, 11, 1, 0, 0), utc(2026, 11, 2, 0, 0), tz);

    let got = slots(&rules, &p);

    assert_eq!(got.len(), 4);
    assert_eq!(got[0].start, utc(2026, 11, 1, 4, 0));
    assert_eq!(got[3].end, utc(2026, 11, 1, 8, 0));
}

#[test]
fn offset_change_between_weeks_shifts_utc_slot() {
    // Monday 09:00 New York: EST (14:00 UTC) before the switch, EDT (13:00 UTC) after.
    let tz: Tz = "America/New_York".parse().unwrap();
    let rules = vec![rule(1, (9, 0), (10, 0))];
    let p = params(60, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 10, 0, 0), tz);

    let got = slots(&rules, &p);

    assert_eq!(
        got,
        vec![
            slot(utc(2026, 3, 2, 14, 0), utc(2026, 3, 2, 15, 0)),
            slot(utc(2026, 3, 9, 13, 0), utc(2026, 3, 9, 14, 0)),
        ]
    );
}

#[test]
fn window_starting_in_gap_shifts_forward_by_default() {
    // 02:30 does not exist on 2026-03-08 in New York; the window starts at 03:00 EDT.
    let tz: Tz = "America/New_York".parse().unwrap();
    let rules = vec![rule(0, (2, 30), (4, 0))];
    let p = params(60, 0, utc(2026, 3, 8, 0, 0), utc(2026, 3, 9, 0, 0), tz);

    assert_eq!(
        slots(&rules, &p),
        vec![slot(utc(2026, 3, 8, 7, 0), utc(2026, 3, 8, 8, 0))]
    );
}

#[test]
fn window_starting_in_gap_is_skipped_under_skip_policy() {
    let tz: Tz = "America/New_York".parse().unwrap();
    let rules = vec![rule(0, (2, 30), (4, 0))];
    let mut p = params(60, 0, utc(2026, 3, 8, 0, 0), utc(2026, 3, 9, 0, 0), tz);
    p.dst_policy = DstPolicy::Skip;

    assert!(slots(&rules, &p).is_empty());
}

// ── Purity ──────────────────────────────────────────────────────────────────

#[test]
fn generation_is_restartable() {
    let rules = vec![rule(1, (9, 0), (17, 0)), rule(4, (13, 0), (18, 0))];
    let p = params(45, 10, utc(2026, 3, 1, 0, 0), utc(2026, 3, 31, 0, 0), Tz::UTC);

    let iter = generate_slots(&rules, &p).unwrap();
    let first: Vec<_> = iter.clone().collect();
    let second: Vec<_> = iter.collect();
    let third = slots(&rules, &p);

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first, third);
}

// ── Validation ──────────────────────────────────────────────────────────────

#[test]
fn reversed_rule_is_rejected() {
    let rules = vec![rule(1, (12, 0), (9, 0))];
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let err = generate_slots(&rules, &p).unwrap_err();
    assert!(matches!(err, BookingError::InvalidRule(_)));
}

#[test]
fn weekday_out_of_range_is_rejected() {
    let rules = vec![rule(7, (9, 0), (12, 0))];
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let err = generate_slots(&rules, &p).unwrap_err();
    assert!(matches!(err, BookingError::InvalidRule(_)));
}

#[test]
fn rule_in_foreign_timezone_is_rejected() {
    let mut r = rule(1, (9, 0), (12, 0));
    r.timezone = Some("Europe/Berlin".parse().unwrap());
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let err = generate_slots(&[r], &p).unwrap_err();
    assert!(matches!(err, BookingError::InvalidRule(_)));
}

#[test]
fn rule_with_matching_timezone_is_accepted() {
    let mut r = rule(1, (9, 0), (10, 0));
    r.timezone = Some(Tz::UTC);
    let p = params(30, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    assert_eq!(slots(&[r], &p).len(), 2);
}

#[test]
fn zero_duration_is_rejected() {
    let rules = vec![rule(1, (9, 0), (12, 0))];
    let p = params(0, 0, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let err = generate_slots(&rules, &p).unwrap_err();
    assert!(matches!(err, BookingError::InvalidConfig(_)));
}

#[test]
fn empty_range_is_rejected() {
    let rules = vec![rule(1, (9, 0), (12, 0))];
    let p = params(30, 0, utc(2026, 3, 3, 0, 0), utc(2026, 3, 3, 0, 0), Tz::UTC);

    let err = generate_slots(&rules, &p).unwrap_err();
    assert!(matches!(err, BookingError::InvalidRange(_)));
}
