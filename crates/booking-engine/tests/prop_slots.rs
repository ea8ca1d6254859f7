//! Property-based tests for slot generation and conflict filtering.
//!
//! These check invariants that hold for any weekly schedule, not just the
//! fixed scenarios in `slots_tests.rs` and `conflict_tests.rs`.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;
use uuid::Uuid;

use booking_engine::conflict::{filter_available, is_slot_free};
use booking_engine::dst::DstPolicy;
use booking_engine::slots::{generate_slots, SlotParams};
use booking_engine::{AvailabilityRule, Interval};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_timezone() -> impl Strategy<Value = Tz> {
    prop_oneof![
        Just(Tz::UTC),
        Just(chrono_tz::America::New_York),
        Just(chrono_tz::Europe::London),
        Just(chrono_tz::Asia::Tokyo),
        Just(chrono_tz::Australia::Sydney),
    ]
}

/// A rule on any weekday, on the quarter hour, at least 15 minutes long.
fn arb_rule() -> impl Strategy<Value = AvailabilityRule> {
    (0u8..=6, 0u32..=90, 1u32..=32).prop_map(|(day, start_q, len_q)| {
        let start_min = start_q * 15;
        let end_min = (start_min + len_q * 15).min(23 * 60 + 45);
        let start = NaiveTime::from_hms_opt(start_min / 60, start_min % 60, 0).unwrap();
        let end = NaiveTime::from_hms_opt(end_min / 60, end_min % 60, 0).unwrap();
        AvailabilityRule::new(Uuid::nil(), day, start, end)
    })
}

fn arb_rules() -> impl Strategy<Value = Vec<AvailabilityRule>> {
    prop::collection::vec(arb_rule(), 1..6)
}

fn arb_duration() -> impl Strategy<Value = u32> {
    prop_oneof![Just(15u32), Just(30), Just(45), Just(60), Just(90)]
}

fn arb_buffer() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), Just(5), Just(10), Just(15), Just(30)]
}

/// Busy intervals scattered over the range, 5 to 180 minutes long.
fn arb_busy() -> impl Strategy<Value = Vec<Interval>> {
    prop::collection::vec((0i64..(14 * 24 * 60), 5i64..=180), 0..12).prop_map(|raw| {
        raw.into_iter()
            .map(|(offset, len)| {
                let start = range_start() + Duration::minutes(offset);
                Interval::new(start, start + Duration::minutes(len))
            })
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn range_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

/// Two weeks spanning the US and EU spring-forward transitions.
fn params(duration: u32, buffer: u32, tz: Tz) -> SlotParams {
    SlotParams {
        duration_minutes: duration,
        buffer_minutes: buffer,
        range_start: range_start(),
        range_end: range_start() + Duration::days(14),
        organizer_tz: tz,
        not_before: range_start(),
        dst_policy: DstPolicy::ShiftForward,
    }
}

fn slots_for(rules: &[AvailabilityRule], p: &SlotParams) -> Vec<Interval> {
    generate_slots(rules, p).unwrap().collect()
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Property 1: every slot is exactly `duration` long and starts in range
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn slots_have_exact_duration_and_start_in_range(
        rules in arb_rules(),
        duration in arb_duration(),
        buffer in arb_buffer(),
        tz in arb_timezone(),
    ) {
        let p = params(duration, buffer, tz);
        for slot in slots_for(&rules, &p) {
            prop_assert_eq!(slot.duration_minutes(), duration as i64);
            prop_assert!(slot.start >= p.range_start);
            prop_assert!(slot.start < p.range_end);
        }
    }
}

// ---------------------------------------------------------------------------
// Property 2: slots are sorted and never overlap
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn slots_are_sorted_and_disjoint(
        rules in arb_rules(),
        duration in arb_duration(),
        buffer in arb_buffer(),
        tz in arb_timezone(),
    ) {
        let slots = slots_for(&rules, &params(duration, buffer, tz));
        for pair in slots.windows(2) {
            prop_assert!(
                pair[0].end <= pair[1].start,
                "overlapping slots: {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Property 3: slots from one window are spaced by at least the buffer
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn consecutive_slots_leave_room_for_buffer(
        rule in arb_rule(),
        duration in arb_duration(),
        buffer in arb_buffer(),
        tz in arb_timezone(),
    ) {
        let slots = slots_for(&[rule], &params(duration, buffer, tz));
        for pair in slots.windows(2) {
            prop_assert!(pair[1].start - pair[0].end >= Duration::minutes(buffer as i64));
        }
    }
}

// ---------------------------------------------------------------------------
// Property 4: generation is deterministic and the iterator restartable
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn generation_is_deterministic(
        rules in arb_rules(),
        duration in arb_duration(),
        tz in arb_timezone(),
    ) {
        let p = params(duration, 15, tz);
        let iter = generate_slots(&rules, &p).unwrap();
        let first: Vec<Interval> = iter.clone().collect();
        let second: Vec<Interval> = iter.collect();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, slots_for(&rules, &p));
    }
}

// ---------------------------------------------------------------------------
// Property 5: filtered slots never touch padded busy time
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn available_slots_avoid_padded_busy_time(
        rules in arb_rules(),
        duration in arb_duration(),
        buffer in arb_buffer(),
        tz in arb_timezone(),
        busy in arb_busy(),
    ) {
        let candidates = slots_for(&rules, &params(duration, buffer, tz));
        let margin = Duration::minutes(buffer as i64);
        let available = filter_available(candidates.clone(), &busy, margin);

        for slot in &available {
            for b in &busy {
                prop_assert!(
                    !(slot.start < b.end + margin && slot.end > b.start - margin),
                    "slot {:?} within buffer of busy {:?}",
                    slot,
                    b
                );
            }
        }
        // Nothing free is dropped.
        let kept = candidates
            .iter()
            .filter(|s| is_slot_free(s, &busy, margin))
            .count();
        prop_assert_eq!(kept, available.len());
    }
}
