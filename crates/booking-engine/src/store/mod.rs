//! Persistence seam consumed by the resolver.
//!
//! A [`BookingStore`] is handed to [`crate::resolver::Resolver`] explicitly;
//! nothing in this crate reaches for process-wide state. Reads for availability
//! queries go straight to the store. The mutating path runs inside
//! [`BookingStore::with_organizer_lock`], which gives the closure a
//! [`BookingTx`] whose reads and writes are atomic with respect to every other
//! locked section for the same organizer.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::Duration;
use uuid::Uuid;

use crate::error::StoreError;
use crate::interval::Interval;
use crate::model::{
    AvailabilityRule, BookedMeeting, BookingStatus, CalendarEvent, MeetingRequestConfig,
    NewBooking, Profile,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to the rows the resolver needs, plus the locked write path.
pub trait BookingStore: Send + Sync {
    fn meeting_request_by_slug(&self, slug: &str) -> StoreResult<Option<MeetingRequestConfig>>;

    fn meeting_request(&self, id: Uuid) -> StoreResult<Option<MeetingRequestConfig>>;

    fn availability_rules(&self, meeting_request_id: Uuid) -> StoreResult<Vec<AvailabilityRule>>;

    fn profile(&self, organizer_id: Uuid) -> StoreResult<Option<Profile>>;

    /// Events that may block time in `window`. Recurring events are returned
    /// whenever their series starts before the window ends.
    fn calendar_events(&self, organizer_id: Uuid, window: Interval)
        -> StoreResult<Vec<CalendarEvent>>;

    /// Confirmed bookings across all of the organizer's meeting requests
    /// that overlap `window`.
    fn confirmed_bookings(
        &self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookedMeeting>>;

    fn booking(&self, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>>;

    /// Run `f` while holding the organizer's write guard.
    ///
    /// Writes made through the [`BookingTx`] become visible only if `f`
    /// returns `Ok`; any `Err` discards them all.
    fn with_organizer_lock<T, E, F>(&self, organizer_id: Uuid, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn BookingTx) -> Result<T, E>,
        E: From<StoreError>;
}

/// Operations available inside an organizer's locked section.
pub trait BookingTx {
    fn calendar_events(
        &mut self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<CalendarEvent>>;

    fn confirmed_bookings(
        &mut self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookedMeeting>>;

    fn booking(&mut self, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>>;

    /// Insert a confirmed booking.
    ///
    /// Fails with [`StoreError::Conflict`] when it would overlap another
    /// confirmed booking of the same organizer.
    fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<BookedMeeting>;

    fn set_booking_status(&mut self, booking_id: Uuid, status: BookingStatus) -> StoreResult<()>;
}

/// Margin used when pre-selecting all-day events, whose local days can
/// extend up to a day past their stored UTC bounds.
pub(crate) fn all_day_margin() -> Duration {
    Duration::days(1)
}

/// Whether a stored event can contribute busy time to `window`.
pub(crate) fn event_may_block(event: &CalendarEvent, window: &Interval) -> bool {
    if event.recurrence_rule.is_some() {
        return event.start < window.end;
    }
    let margin = if event.is_all_day {
        all_day_margin()
    } else {
        Duration::zero()
    };
    event.start < window.end + margin && event.end > window.start - margin
}
