//! In-process [`BookingStore`].
//!
//! Each organizer gets its own mutex, so confirmations for different
//! organizers never wait on each other. Writes made inside a locked section
//! are staged and applied only when the closure succeeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{event_may_block, BookingStore, BookingTx, StoreResult};
use crate::error::StoreError;
use crate::expander::validate_recurrence;
use crate::interval::Interval;
use crate::model::{
    AvailabilityRule, BookedMeeting, BookingStatus, CalendarEvent, MeetingRequestConfig,
    NewBooking, Profile,
};

#[derive(Debug, Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    meeting_requests: HashMap<Uuid, MeetingRequestConfig>,
    slugs: HashMap<String, Uuid>,
    rules: Vec<AvailabilityRule>,
    events: Vec<CalendarEvent>,
    bookings: HashMap<Uuid, BookedMeeting>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    organizer_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: Profile) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.profiles.contains_key(&profile.id) {
            return Err(StoreError::Duplicate(format!("profile {}", profile.id)));
        }
        state.profiles.insert(profile.id, profile);
        Ok(())
    }

    pub fn insert_meeting_request(&self, request: MeetingRequestConfig) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.profiles.contains_key(&request.organizer_id) {
            return Err(StoreError::NotFound(format!(
                "organizer {}",
                request.organizer_id
            )));
        }
        if state.slugs.contains_key(&request.slug) {
            return Err(StoreError::Duplicate(format!("slug {}", request.slug)));
        }
        state.slugs.insert(request.slug.clone(), request.id);
        state.meeting_requests.insert(request.id, request);
        Ok(())
    }

    pub fn insert_rule(&self, rule: AvailabilityRule) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.meeting_requests.contains_key(&rule.meeting_request_id) {
            return Err(StoreError::NotFound(format!(
                "meeting request {}",
                rule.meeting_request_id
            )));
        }
        state.rules.push(rule);
        Ok(())
    }

    /// Fails with [`StoreError::Invalid`] if the recurrence rule does not parse.
    pub fn insert_event(&self, event: CalendarEvent) -> StoreResult<()> {
        validate_recurrence(&event).map_err(|e| StoreError::Invalid(e.to_string()))?;
        self.state.write().events.push(event);
        Ok(())
    }

    pub fn set_meeting_active(&self, meeting_request_id: Uuid, active: bool) -> StoreResult<()> {
        let mut state = self.state.write();
        let request = state
            .meeting_requests
            .get_mut(&meeting_request_id)
            .ok_or_else(|| StoreError::NotFound(format!("meeting request {}", meeting_request_id)))?;
        request.is_active = active;
        Ok(())
    }

    /// Make the next `count` booking writes fail with a backend error.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Every booking row, including cancelled and rescheduled history.
    pub fn all_bookings(&self) -> Vec<BookedMeeting> {
        let mut bookings: Vec<BookedMeeting> =
            self.state.read().bookings.values().cloned().collect();
        bookings.sort_by_key(|b| (b.start, b.created_at));
        bookings
    }

    fn organizer_lock(&self, organizer_id: Uuid) -> Arc<Mutex<()>> {
        self.organizer_locks
            .lock()
            .entry(organizer_id)
            .or_default()
            .clone()
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn events_for(state: &State, organizer_id: Uuid, window: &Interval) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = state
        .events
        .iter()
        .filter(|e| e.organizer_id == organizer_id && event_may_block(e, window))
        .cloned()
        .collect();
    events.sort_by_key(|e| e.start);
    events
}

fn confirmed_for<'a, I>(bookings: I, organizer_id: Uuid, window: &Interval) -> Vec<BookedMeeting>
where
    I: Iterator<Item = &'a BookedMeeting>,
{
    let mut out: Vec<BookedMeeting> = bookings
        .filter(|b| {
            b.organizer_id == organizer_id
                && b.status.is_blocking()
                && b.interval().overlaps(window)
        })
        .cloned()
        .collect();
    out.sort_by_key(|b| b.start);
    out
}

impl BookingStore for MemoryStore {
    fn meeting_request_by_slug(&self, slug: &str) -> StoreResult<Option<MeetingRequestConfig>> {
        let state = self.state.read();
        Ok(state
            .slugs
            .get(slug)
            .and_then(|id| state.meeting_requests.get(id))
            .cloned())
    }

    fn meeting_request(&self, id: Uuid) -> StoreResult<Option<MeetingRequestConfig>> {
        Ok(self.state.read().meeting_requests.get(&id).cloned())
    }

    fn availability_rules(&self, meeting_request_id: Uuid) -> StoreResult<Vec<AvailabilityRule>> {
        Ok(self
            .state
            .read()
            .rules
            .iter()
            .filter(|r| r.meeting_request_id == meeting_request_id)
            .cloned()
            .collect())
    }

    fn profile(&self, organizer_id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.state.read().profiles.get(&organizer_id).cloned())
    }

    fn calendar_events(
        &self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<CalendarEvent>> {
        Ok(events_for(&self.state.read(), organizer_id, &window))
    }

    fn confirmed_bookings(
        &self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookedMeeting>> {
        let state = self.state.read();
        Ok(confirmed_for(state.bookings.values(), organizer_id, &window))
    }

    fn booking(&self, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>> {
        Ok(self.state.read().bookings.get(&booking_id).cloned())
    }

    fn with_organizer_lock<T, E, F>(&self, organizer_id: Uuid, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn BookingTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let lock = self.organizer_lock(organizer_id);
        let _guard = lock.lock();

        let mut tx = MemoryTx {
            store: self,
            staged: HashMap::new(),
        };
        let value = f(&mut tx)?;

        let staged = tx.staged;
        if !staged.is_empty() {
            debug!(%organizer_id, writes = staged.len(), "applying staged booking writes");
            let mut state = self.state.write();
            state.bookings.extend(staged);
        }
        Ok(value)
    }
}

/// Locked section over a [`MemoryStore`]; reads see staged writes.
struct MemoryTx<'a> {
    store: &'a MemoryStore,
    staged: HashMap<Uuid, BookedMeeting>,
}

impl MemoryTx<'_> {
    fn bookings_view(&self) -> Vec<BookedMeeting> {
        let state = self.store.state.read();
        state
            .bookings
            .values()
            .filter(|b| !self.staged.contains_key(&b.id))
            .chain(self.staged.values())
            .cloned()
            .collect()
    }
}

impl BookingTx for MemoryTx<'_> {
    fn calendar_events(
        &mut self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<CalendarEvent>> {
        Ok(events_for(&self.store.state.read(), organizer_id, &window))
    }

    fn confirmed_bookings(
        &mut self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookedMeeting>> {
        let view = self.bookings_view();
        Ok(confirmed_for(view.iter(), organizer_id, &window))
    }

    fn booking(&mut self, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>> {
        if let Some(staged) = self.staged.get(&booking_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.state.read().bookings.get(&booking_id).cloned())
    }

    fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<BookedMeeting> {
        if self.store.take_write_failure() {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }

        let organizer_id = booking.organizer_id;
        let view = self.bookings_view();
        if !confirmed_for(view.iter(), organizer_id, &booking.slot).is_empty() {
            return Err(StoreError::Conflict(organizer_id.to_string()));
        }

        let booked = booking.into_booked(Utc::now());
        self.staged.insert(booked.id, booked.clone());
        Ok(booked)
    }

    fn set_booking_status(&mut self, booking_id: Uuid, status: BookingStatus) -> StoreResult<()> {
        let mut booking = self
            .booking(booking_id)?
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", booking_id)))?;
        booking.status = status;
        self.staged.insert(booking_id, booking);
        Ok(())
    }
}
