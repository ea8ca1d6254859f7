//! Error types for availability resolution and booking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the resolver.
///
/// Every variant is recoverable by the caller: the expected reaction is to
/// re-query availability and retry with a fresh slot.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Meeting request is inactive: {0}")]
    MeetingInactive(String),

    /// The requested slot does not line up with any generated candidate.
    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    /// Another confirmation won the race, or the write could not be confirmed.
    #[error("Slot is no longer available")]
    SlotNoLongerAvailable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid availability rule: {0}")]
    InvalidRule(String),

    /// A calendar event's RRULE could not be parsed.
    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid attendee: {0}")]
    InvalidAttendee(String),

    #[error("Booking {0} is not confirmed")]
    BookingNotConfirmed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl BookingError {
    /// Stable wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BookingError::InvalidRange(_) => ErrorCode::InvalidRange,
            BookingError::MeetingInactive(_) => ErrorCode::MeetingInactive,
            BookingError::InvalidSlot(_) => ErrorCode::InvalidSlot,
            BookingError::SlotNoLongerAvailable => ErrorCode::SlotNoLongerAvailable,
            BookingError::NotFound(_) => ErrorCode::NotFound,
            BookingError::InvalidTimezone(_)
            | BookingError::InvalidRule(_)
            | BookingError::InvalidRecurrence(_)
            | BookingError::InvalidConfig(_) => ErrorCode::InvalidConfiguration,
            BookingError::InvalidAttendee(_) => ErrorCode::InvalidAttendee,
            BookingError::BookingNotConfirmed(_) => ErrorCode::BookingNotConfirmed,
            BookingError::Storage(_) => ErrorCode::StorageUnavailable,
        }
    }
}

/// Error codes exposed through the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidRange,
    MeetingInactive,
    InvalidSlot,
    SlotNoLongerAvailable,
    NotFound,
    InvalidConfiguration,
    InvalidAttendee,
    BookingNotConfirmed,
    StorageUnavailable,
}

/// Errors raised by a [`crate::store::BookingStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage-level overlap guard rejected the write.
    #[error("conflicting booking for organizer {0}")]
    Conflict(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// The record failed validation and was not written.
    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
