//! Tests for interval arithmetic and busy-period merging.

use chrono::{DateTime, Duration, TimeZone, Utc};
use booking_engine::interval::{merge_busy_in_window, merge_intervals};
use booking_engine::Interval;

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, min, 0).unwrap()
}

#[test]
fn adjacent_intervals_do_not_overlap() {
    let a = Interval::new(at(9, 0), at(10, 0));
    let b = Interval::new(at(10, 0), at(11, 0));

    assert!(!a.overlaps(&b));
    assert!(!b.overlaps(&a));
}

#[test]
fn partial_and_contained_intervals_overlap() {
    let outer = Interval::new(at(9, 0), at(12, 0));

    assert!(outer.overlaps(&Interval::new(at(11, 30), at(13, 0))));
    assert!(outer.overlaps(&Interval::new(at(10, 0), at(10, 30))));
}

#[test]
fn padding_widens_both_sides() {
    let padded = Interval::new(at(10, 0), at(10, 30)).padded(Duration::minutes(15));

    assert_eq!(padded, Interval::new(at(9, 45), at(10, 45)));
    assert_eq!(padded.duration_minutes(), 60);
}

#[test]
fn merge_coalesces_overlapping_and_touching() {
    let merged = merge_intervals(&[
        Interval::new(at(13, 0), at(14, 0)),
        Interval::new(at(9, 0), at(10, 0)),
        Interval::new(at(10, 0), at(11, 0)),
        Interval::new(at(10, 30), at(10, 45)),
    ]);

    assert_eq!(
        merged,
        vec![
            Interval::new(at(9, 0), at(11, 0)),
            Interval::new(at(13, 0), at(14, 0)),
        ]
    );
}

#[test]
fn merge_drops_empty_intervals() {
    let merged = merge_intervals(&[Interval::new(at(9, 0), at(9, 0))]);

    assert!(merged.is_empty());
}

#[test]
fn busy_outside_window_is_ignored_but_edges_are_kept_whole() {
    let window = Interval::new(at(9, 0), at(12, 0));
    let merged = merge_busy_in_window(
        &[
            Interval::new(at(6, 0), at(7, 0)),
            Interval::new(at(8, 30), at(9, 15)),
            Interval::new(at(13, 0), at(14, 0)),
        ],
        window,
    );

    // Not clipped: the part before 09:00 still matters for buffer checks.
    assert_eq!(merged, vec![Interval::new(at(8, 30), at(9, 15))]);
}
