//! Availability queries and race-free booking confirmation.
//!
//! Queries are read-only: they load rules and busy time from a snapshot and
//! run the slot generator and conflict filter over it. Confirmation,
//! cancellation and rescheduling re-read busy time inside the organizer's
//! locked section and write only if the slot is still free there, so at most
//! one confirmed booking can ever cover an overlapping interval.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::conflict::{conflicting_intervals, filter_available};
use crate::error::{BookingError, Result, StoreError};
use crate::expander::events_blocking_intervals;
use crate::interval::{merge_busy_in_window, BlockingInterval, CandidateSlot, Interval};
use crate::model::{
    Attendee, AvailabilityRule, BookedMeeting, BookingStatus, CalendarEvent, MeetingRequestConfig,
    NewBooking, Profile,
};
use crate::slots::{generate_slots, SlotParams};
use crate::store::{BookingStore, BookingTx};

/// Source of "now" for discarding past slots.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything loaded for one meeting request before slots can be computed.
struct BookingContext {
    request: MeetingRequestConfig,
    profile: Profile,
    rules: Vec<AvailabilityRule>,
}

/// Outcome of one locked commit attempt.
enum CommitFailure {
    /// Lost the race; never retried.
    Taken,
    /// Persistence failed; eligible for the single retry.
    Store(StoreError),
    Other(BookingError),
}

impl From<BookingError> for CommitFailure {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotNoLongerAvailable => CommitFailure::Taken,
            BookingError::Storage(StoreError::Conflict(_)) => CommitFailure::Taken,
            BookingError::Storage(e) => CommitFailure::Store(e),
            other => CommitFailure::Other(other),
        }
    }
}

pub struct Resolver<S> {
    store: S,
    config: ResolverConfig,
    clock: Box<dyn Clock>,
}

impl<S: BookingStore> Resolver<S> {
    pub fn new(store: S, config: ResolverConfig) -> Self {
        Self {
            store,
            config,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Bookable slots for `slug` starting within `[range_start, range_end)`.
    ///
    /// # Errors
    /// `NotFound` for an unknown slug, `MeetingInactive` for a disabled one,
    /// `InvalidRange` for an empty, reversed or oversized range.
    #[instrument(skip(self))]
    pub fn available_slots(
        &self,
        slug: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<CandidateSlot>> {
        self.validate_range(range_start, range_end)?;
        let ctx = self.load_active(slug)?;

        let params = self.slot_params(&ctx, range_start, range_end);
        let candidates = generate_slots(&ctx.rules, &params)?;

        let window = Interval::new(
            range_start - ctx.request.buffer(),
            range_end + ctx.request.duration() + ctx.request.buffer(),
        );
        let organizer_id = ctx.request.organizer_id;
        let events = self.store.calendar_events(organizer_id, window)?;
        let bookings = self.store.confirmed_bookings(organizer_id, window)?;
        let busy = collect_busy(&events, &bookings, window)?;

        let slots = filter_available(candidates, &busy, ctx.request.buffer());
        debug!(
            slots = slots.len(),
            busy = busy.len(),
            "computed available slots"
        );
        Ok(slots)
    }

    /// Confirm `requested` for `attendee`.
    ///
    /// Busy time is re-read and re-checked inside the organizer's locked
    /// section; the insert happens there too. A failed write is retried once
    /// after the configured backoff, then reported as `SlotNoLongerAvailable`.
    #[instrument(skip(self, attendee, notes))]
    pub fn confirm_booking(
        &self,
        slug: &str,
        requested: CandidateSlot,
        attendee: Attendee,
        notes: Option<String>,
    ) -> Result<BookedMeeting> {
        validate_attendee(&attendee)?;
        let ctx = self.load_active(slug)?;
        self.ensure_aligned(&ctx, requested)?;

        let booking = NewBooking {
            meeting_request_id: ctx.request.id,
            organizer_id: ctx.request.organizer_id,
            attendee,
            slot: requested,
            notes,
            rescheduled_from: None,
        };
        let booked = self.commit_with_retry(&ctx.request, booking, None)?;
        info!(booking_id = %booked.id, slug, "booking confirmed");
        Ok(booked)
    }

    /// Cancel a confirmed booking, freeing its time for future queries.
    ///
    /// Cancelling an already cancelled booking returns it unchanged.
    #[instrument(skip(self))]
    pub fn cancel_booking(&self, booking_id: Uuid) -> Result<BookedMeeting> {
        let booking = self
            .store
            .booking(booking_id)?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        let cancelled = self
            .store
            .with_organizer_lock(booking.organizer_id, |tx| -> Result<BookedMeeting> {
                let current = tx
                    .booking(booking_id)?
                    .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;
                match current.status {
                    BookingStatus::Cancelled => Ok(current),
                    BookingStatus::Rescheduled => {
                        Err(BookingError::BookingNotConfirmed(booking_id.to_string()))
                    }
                    BookingStatus::Confirmed => {
                        tx.set_booking_status(booking_id, BookingStatus::Cancelled)?;
                        Ok(BookedMeeting {
                            status: BookingStatus::Cancelled,
                            ..current
                        })
                    }
                }
            })?;
        info!(%booking_id, "booking cancelled");
        Ok(cancelled)
    }

    /// Move a confirmed booking to `new_slot`.
    ///
    /// The old booking is marked `rescheduled` and a new confirmed booking
    /// pointing back at it is inserted, both in one locked section. If the new
    /// slot is taken the old booking is left untouched.
    #[instrument(skip(self))]
    pub fn reschedule_booking(
        &self,
        booking_id: Uuid,
        new_slot: CandidateSlot,
    ) -> Result<BookedMeeting> {
        let booking = self
            .store
            .booking(booking_id)?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::BookingNotConfirmed(booking_id.to_string()));
        }

        let request = self
            .store
            .meeting_request(booking.meeting_request_id)?
            .ok_or_else(|| {
                BookingError::NotFound(format!("meeting request {}", booking.meeting_request_id))
            })?;
        if !request.is_active {
            return Err(BookingError::MeetingInactive(request.slug));
        }
        let ctx = self.load_context(request)?;
        self.ensure_aligned(&ctx, new_slot)?;

        let replacement = NewBooking {
            meeting_request_id: booking.meeting_request_id,
            organizer_id: booking.organizer_id,
            attendee: booking.attendee,
            slot: new_slot,
            notes: booking.notes,
            rescheduled_from: Some(booking_id),
        };
        let booked = self.commit_with_retry(&ctx.request, replacement, Some(booking_id))?;
        info!(old = %booking_id, new = %booked.id, "booking rescheduled");
        Ok(booked)
    }

    fn validate_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        if end <= start {
            return Err(BookingError::InvalidRange(format!(
                "range end {} is not after start {}",
                end, start
            )));
        }
        if end - start > self.config.max_range() {
            return Err(BookingError::InvalidRange(format!(
                "range exceeds {} days",
                self.config.max_range_days
            )));
        }
        Ok(())
    }

    fn load_active(&self, slug: &str) -> Result<BookingContext> {
        let request = self
            .store
            .meeting_request_by_slug(slug)?
            .ok_or_else(|| BookingError::NotFound(format!("meeting request {}", slug)))?;
        if !request.is_active {
            return Err(BookingError::MeetingInactive(slug.to_string()));
        }
        self.load_context(request)
    }

    fn load_context(&self, request: MeetingRequestConfig) -> Result<BookingContext> {
        let profile = self
            .store
            .profile(request.organizer_id)?
            .ok_or_else(|| BookingError::NotFound(format!("organizer {}", request.organizer_id)))?;
        let rules = self.store.availability_rules(request.id)?;
        Ok(BookingContext {
            request,
            profile,
            rules,
        })
    }

    fn slot_params(
        &self,
        ctx: &BookingContext,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> SlotParams {
        SlotParams {
            duration_minutes: ctx.request.duration_minutes,
            buffer_minutes: ctx.request.buffer_minutes,
            range_start,
            range_end,
            organizer_tz: ctx.profile.timezone,
            not_before: self.clock.now() - self.config.now_skew(),
            dst_policy: self.config.dst_policy,
        }
    }

    /// Reject a slot that the generator would not produce right now.
    fn ensure_aligned(&self, ctx: &BookingContext, slot: CandidateSlot) -> Result<()> {
        if slot.is_empty() {
            return Err(BookingError::InvalidSlot(format!(
                "slot end {} is not after start {}",
                slot.end, slot.start
            )));
        }
        let aligned = generate_slots(&ctx.rules, &self.slot_params(ctx, slot.start, slot.end))?
            .any(|candidate| candidate == slot);
        if !aligned {
            return Err(BookingError::InvalidSlot(format!(
                "{} - {} is not an offered slot",
                slot.start, slot.end
            )));
        }
        Ok(())
    }

    fn commit_with_retry(
        &self,
        request: &MeetingRequestConfig,
        booking: NewBooking,
        replacing: Option<Uuid>,
    ) -> Result<BookedMeeting> {
        for attempt in 0..2 {
            match self.commit(request, booking.clone(), replacing) {
                Ok(booked) => return Ok(booked),
                Err(CommitFailure::Taken) => {
                    warn!(slug = %request.slug, "slot taken by a concurrent booking");
                    return Err(BookingError::SlotNoLongerAvailable);
                }
                Err(CommitFailure::Store(err)) if attempt == 0 => {
                    warn!(error = %err, "booking write failed, retrying");
                    std::thread::sleep(self.config.retry_backoff());
                }
                Err(CommitFailure::Store(err)) => {
                    warn!(error = %err, "booking write failed after retry");
                    return Err(BookingError::SlotNoLongerAvailable);
                }
                Err(CommitFailure::Other(err)) => return Err(err),
            }
        }
        Err(BookingError::SlotNoLongerAvailable)
    }

    /// One locked attempt: re-read busy time, re-check, write.
    ///
    /// The buffer applied is the requesting link's own. Existing bookings
    /// made through other links of the organizer are padded by this link's
    /// buffer, not by the buffer of the link they were made through.
    fn commit(
        &self,
        request: &MeetingRequestConfig,
        booking: NewBooking,
        replacing: Option<Uuid>,
    ) -> std::result::Result<BookedMeeting, CommitFailure> {
        let organizer_id = request.organizer_id;
        let buffer = request.buffer();
        let slot = booking.slot;

        self.store
            .with_organizer_lock(organizer_id, |tx| -> Result<BookedMeeting> {
                if let Some(old_id) = replacing {
                    let old = tx
                        .booking(old_id)?
                        .ok_or_else(|| BookingError::NotFound(format!("booking {}", old_id)))?;
                    if old.status != BookingStatus::Confirmed {
                        return Err(BookingError::BookingNotConfirmed(old_id.to_string()));
                    }
                    tx.set_booking_status(old_id, BookingStatus::Rescheduled)?;
                }

                let window = slot.padded(buffer);
                let busy = locked_busy(tx, organizer_id, window)?;
                let conflicts = conflicting_intervals(&slot, &busy, buffer);
                if !conflicts.is_empty() {
                    debug!(conflicts = conflicts.len(), "slot blocked on re-check");
                    return Err(BookingError::SlotNoLongerAvailable);
                }

                Ok(tx.insert_booking(booking)?)
            })
            .map_err(CommitFailure::from)
    }
}

fn locked_busy(
    tx: &mut dyn BookingTx,
    organizer_id: Uuid,
    window: Interval,
) -> Result<Vec<BlockingInterval>> {
    let events = tx.calendar_events(organizer_id, window)?;
    let bookings = tx.confirmed_bookings(organizer_id, window)?;
    collect_busy(&events, &bookings, window)
}

/// Event occurrences plus confirmed bookings touching `window`, merged.
fn collect_busy(
    events: &[CalendarEvent],
    bookings: &[BookedMeeting],
    window: Interval,
) -> Result<Vec<BlockingInterval>> {
    let mut busy = events_blocking_intervals(events, window)?;
    busy.extend(
        bookings
            .iter()
            .filter(|b| b.status.is_blocking())
            .map(BookedMeeting::interval),
    );
    Ok(merge_busy_in_window(&busy, window))
}

fn validate_attendee(attendee: &Attendee) -> Result<()> {
    if attendee.name.trim().is_empty() {
        return Err(BookingError::InvalidAttendee("name is empty".to_string()));
    }
    let email = attendee.email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(BookingError::InvalidAttendee(format!(
            "malformed email {:?}",
            attendee.email
        )));
    }
    Ok(())
}
