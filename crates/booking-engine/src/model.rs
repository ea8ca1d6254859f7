//! Persisted entities consumed and produced by the resolver.
//!
//! All instants are UTC. Local wall-clock values only appear on
//! [`AvailabilityRule`], and are converted exclusively by [`crate::slots`].

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::Interval;

/// Default meeting length for new meeting requests.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;
/// Default idle time around meetings for new meeting requests.
pub const DEFAULT_BUFFER_MINUTES: u32 = 15;

/// An organizer's profile. Only the timezone matters to the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub timezone: Tz,
}

impl Profile {
    pub fn new(email: impl Into<String>, timezone: Tz) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            full_name: None,
            timezone,
        }
    }
}

/// How the meeting is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeetingType {
    InPerson,
    #[default]
    Video,
    Phone,
}

impl MeetingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingType::InPerson => "in-person",
            MeetingType::Video => "video",
            MeetingType::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in-person" => Some(MeetingType::InPerson),
            "video" => Some(MeetingType::Video),
            "phone" => Some(MeetingType::Phone),
            _ => None,
        }
    }
}

/// A published booking link.
///
/// `slug` is the stable public lookup key. Nothing in this crate rewrites it
/// after the record is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRequestConfig {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub meeting_type: MeetingType,
    pub duration_minutes: u32,
    pub buffer_minutes: u32,
    pub is_active: bool,
    pub slug: String,
}

impl MeetingRequestConfig {
    /// A new active meeting request with default duration and buffer.
    pub fn new(organizer_id: Uuid, title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organizer_id,
            title: title.into(),
            description: None,
            location: None,
            meeting_type: MeetingType::default(),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            buffer_minutes: DEFAULT_BUFFER_MINUTES,
            is_active: true,
            slug: slug.into(),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duration_minutes as i64)
    }

    pub fn buffer(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.buffer_minutes as i64)
    }
}

/// A recurring weekly window during which the organizer takes meetings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub meeting_request_id: Uuid,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// `None` means the organizer's timezone.
    pub timezone: Option<Tz>,
}

impl AvailabilityRule {
    pub fn new(
        meeting_request_id: Uuid,
        day_of_week: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_request_id,
            day_of_week,
            start_time,
            end_time,
            timezone: None,
        }
    }
}

/// A calendar event owned by the organizer. Always treated as busy time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Tz,
    pub is_all_day: bool,
    /// RFC 5545 RRULE body, e.g. `FREQ=WEEKLY;BYDAY=MO`.
    pub recurrence_rule: Option<String>,
}

impl CalendarEvent {
    pub fn new(
        organizer_id: Uuid,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organizer_id,
            title: title.into(),
            start,
            end,
            timezone: Tz::UTC,
            is_all_day: false,
            recurrence_rule: None,
        }
    }
}

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            _ => None,
        }
    }

    /// Only confirmed bookings occupy the organizer's time.
    pub fn is_blocking(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }
}

/// The person booking a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: String,
}

impl Attendee {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A booking record. Created only by a successful confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookedMeeting {
    pub id: Uuid,
    pub meeting_request_id: Uuid,
    pub organizer_id: Uuid,
    pub attendee: Attendee,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
    pub notes: Option<String>,
    /// The booking this one replaced, when created by a reschedule.
    pub rescheduled_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl BookedMeeting {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// Everything needed to insert a booking row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub meeting_request_id: Uuid,
    pub organizer_id: Uuid,
    pub attendee: Attendee,
    pub slot: Interval,
    pub notes: Option<String>,
    pub rescheduled_from: Option<Uuid>,
}

impl NewBooking {
    /// Materialize the row with a fresh id and `confirmed` status.
    pub fn into_booked(self, created_at: DateTime<Utc>) -> BookedMeeting {
        BookedMeeting {
            id: Uuid::new_v4(),
            meeting_request_id: self.meeting_request_id,
            organizer_id: self.organizer_id,
            attendee: self.attendee,
            start: self.slot.start,
            end: self.slot.end,
            status: BookingStatus::Confirmed,
            notes: self.notes,
            rescheduled_from: self.rescheduled_from,
            created_at,
        }
    }
}
