//! # booking-engine
//!
//! Meeting availability resolution and race-free booking confirmation.
//!
//! An organizer publishes a booking link (a meeting request with a duration,
//! a buffer and a stable slug) together with weekly availability windows.
//! The engine turns those windows into concrete UTC slots, removes anything
//! that collides with the organizer's calendar or existing bookings, and
//! confirms a chosen slot so that two attendees can never both hold
//! overlapping time.
//!
//! ## Modules
//!
//! - [`slots`] — weekly rules → ordered candidate slots (lazy, DST-aware)
//! - [`dst`] — local wall-clock → UTC conversion and DST gap policies
//! - [`conflict`] — drop candidates that hit busy time or its buffer margin
//! - [`expander`] — calendar events (one-off, all-day, RRULE) → busy intervals
//! - [`resolver`] — availability queries, confirm / cancel / reschedule
//! - [`store`] — persistence seam with in-memory and SQLite implementations
//! - [`api`] — JSON request/response shapes for the public operations
//! - [`config`] — resolver settings loaded from TOML
//! - [`slug`] — public slug generation
//! - [`error`] — Error types

pub mod api;
pub mod config;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod expander;
pub mod interval;
pub mod model;
pub mod resolver;
pub mod slots;
pub mod slug;
pub mod store;

pub use config::ResolverConfig;
pub use conflict::filter_available;
pub use dst::DstPolicy;
pub use error::{BookingError, ErrorCode, StoreError};
pub use interval::{BlockingInterval, CandidateSlot, Interval};
pub use model::{
    Attendee, AvailabilityRule, BookedMeeting, BookingStatus, CalendarEvent, MeetingRequestConfig,
    MeetingType, Profile,
};
pub use resolver::{Clock, FixedClock, Resolver, SystemClock};
pub use slots::{generate_slots, SlotIter, SlotParams};
pub use store::{BookingStore, BookingTx, MemoryStore, SqliteStore};
