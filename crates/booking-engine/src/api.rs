//! JSON-facing request and response shapes for the two public operations.
//!
//! Instants cross this boundary as RFC 3339 strings and are rendered back in
//! UTC with a trailing `Z`. Field names are camelCase on the wire
//! (`rangeStart`, `slotStart`, `bookingId`). Failures become
//! `{"error": "<Code>"}`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BookingError, ErrorCode};
use crate::interval::{CandidateSlot, Interval};
use crate::model::{Attendee, BookedMeeting, BookingStatus};
use crate::resolver::Resolver;
use crate::store::BookingStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub slug: String,
    pub range_start: String,
    pub range_end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDto {
    pub start: String,
    pub end: String,
}

impl From<&CandidateSlot> for SlotDto {
    fn from(slot: &CandidateSlot) -> Self {
        Self {
            start: format_instant(slot.start),
            end: format_instant(slot.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub slug: String,
    pub slot_start: String,
    pub slot_end: String,
    pub attendee_name: String,
    pub attendee_email: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
}

impl From<&BookingError> for ErrorBody {
    fn from(err: &BookingError) -> Self {
        Self { error: err.code() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfirmResponse {
    #[serde(rename_all = "camelCase")]
    Confirmed {
        booking_id: Uuid,
        status: BookingStatus,
    },
    Failed(ErrorBody),
}

impl ConfirmResponse {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmResponse::Confirmed { .. })
    }
}

impl From<&BookedMeeting> for ConfirmResponse {
    fn from(booking: &BookedMeeting) -> Self {
        ConfirmResponse::Confirmed {
            booking_id: booking.id,
            status: booking.status,
        }
    }
}

/// Query bookable slots.
///
/// A disabled meeting request is reported as `NotFound`, the same as an
/// unknown slug, so inactive links do not reveal that they exist.
pub fn query_availability<S: BookingStore>(
    resolver: &Resolver<S>,
    query: &AvailabilityQuery,
) -> Result<Vec<SlotDto>, ErrorBody> {
    let start = parse_instant(&query.range_start).ok_or(ErrorBody {
        error: ErrorCode::InvalidRange,
    })?;
    let end = parse_instant(&query.range_end).ok_or(ErrorBody {
        error: ErrorCode::InvalidRange,
    })?;

    match resolver.available_slots(&query.slug, start, end) {
        Ok(slots) => Ok(slots.iter().map(SlotDto::from).collect()),
        Err(BookingError::MeetingInactive(_)) => Err(ErrorBody {
            error: ErrorCode::NotFound,
        }),
        Err(err) => Err(ErrorBody::from(&err)),
    }
}

/// Confirm a booking.
pub fn confirm_booking<S: BookingStore>(
    resolver: &Resolver<S>,
    request: &ConfirmRequest,
) -> ConfirmResponse {
    let slot = match (
        parse_instant(&request.slot_start),
        parse_instant(&request.slot_end),
    ) {
        (Some(start), Some(end)) => Interval::new(start, end),
        _ => {
            return ConfirmResponse::Failed(ErrorBody {
                error: ErrorCode::InvalidSlot,
            })
        }
    };
    let attendee = Attendee::new(request.attendee_name.clone(), request.attendee_email.clone());

    match resolver.confirm_booking(&request.slug, slot, attendee, request.notes.clone()) {
        Ok(booking) => ConfirmResponse::from(&booking),
        Err(err) => ConfirmResponse::Failed(ErrorBody::from(&err)),
    }
}

/// RFC 3339 in UTC, second precision, `Z` suffix.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 instant, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|ndt| ndt.and_utc())
}
