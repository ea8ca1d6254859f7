//! SQLite-backed [`BookingStore`].
//!
//! Locked sections run in `BEGIN IMMEDIATE` transactions, which take the
//! database write lock up front, so the re-read and insert of a confirmation
//! cannot interleave with another writer, even one using a separate
//! connection to the same file. A trigger on `booked_meetings` is the
//! authoritative overlap guard: it aborts any write that would leave two
//! overlapping confirmed bookings for one organizer.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{all_day_margin, BookingStore, BookingTx, StoreResult};
use crate::error::StoreError;
use crate::expander::validate_recurrence;
use crate::interval::Interval;
use crate::model::{
    Attendee, AvailabilityRule, BookedMeeting, BookingStatus, CalendarEvent, MeetingRequestConfig,
    MeetingType, NewBooking, Profile,
};

/// Message raised by the overlap triggers; matched to produce [`StoreError::Conflict`].
const OVERLAP_MARKER: &str = "booking_overlap";

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL,
    full_name   TEXT,
    timezone    TEXT NOT NULL DEFAULT 'UTC'
);

CREATE TABLE IF NOT EXISTS meeting_requests (
    id               TEXT PRIMARY KEY,
    organizer_id     TEXT NOT NULL REFERENCES profiles(id),
    title            TEXT NOT NULL,
    description      TEXT,
    location         TEXT,
    meeting_type     TEXT NOT NULL DEFAULT 'video',
    duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
    buffer_minutes   INTEGER NOT NULL CHECK (buffer_minutes >= 0),
    is_active        INTEGER NOT NULL DEFAULT 1,
    slug             TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS availability_slots (
    id                 TEXT PRIMARY KEY,
    meeting_request_id TEXT NOT NULL REFERENCES meeting_requests(id),
    day_of_week        INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
    start_time         TEXT NOT NULL,
    end_time           TEXT NOT NULL,
    timezone           TEXT
);

CREATE TABLE IF NOT EXISTS events (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    title           TEXT NOT NULL,
    start_ts        INTEGER NOT NULL,
    end_ts          INTEGER NOT NULL,
    timezone        TEXT NOT NULL DEFAULT 'UTC',
    is_all_day      INTEGER NOT NULL DEFAULT 0,
    recurrence_rule TEXT
);

CREATE INDEX IF NOT EXISTS events_user_time ON events (user_id, start_ts);

CREATE TABLE IF NOT EXISTS booked_meetings (
    id                 TEXT PRIMARY KEY,
    meeting_request_id TEXT NOT NULL REFERENCES meeting_requests(id),
    organizer_id       TEXT NOT NULL,
    attendee_name      TEXT NOT NULL,
    attendee_email     TEXT NOT NULL,
    start_ts           INTEGER NOT NULL,
    end_ts             INTEGER NOT NULL,
    status             TEXT NOT NULL DEFAULT 'confirmed'
                       CHECK (status IN ('confirmed', 'cancelled', 'rescheduled')),
    notes              TEXT,
    rescheduled_from   TEXT,
    created_at         INTEGER NOT NULL,
    CHECK (end_ts > start_ts)
);

CREATE INDEX IF NOT EXISTS booked_meetings_organizer_time
    ON booked_meetings (organizer_id, status, start_ts);

CREATE TRIGGER IF NOT EXISTS booked_meetings_no_overlap_insert
BEFORE INSERT ON booked_meetings
WHEN NEW.status = 'confirmed'
BEGIN
    SELECT RAISE(ABORT, 'booking_overlap')
    WHERE EXISTS (
        SELECT 1 FROM booked_meetings b
        WHERE b.organizer_id = NEW.organizer_id
          AND b.status = 'confirmed'
          AND b.start_ts < NEW.end_ts
          AND b.end_ts > NEW.start_ts
    );
END;

CREATE TRIGGER IF NOT EXISTS booked_meetings_no_overlap_update
BEFORE UPDATE OF status, start_ts, end_ts ON booked_meetings
WHEN NEW.status = 'confirmed'
BEGIN
    SELECT RAISE(ABORT, 'booking_overlap')
    WHERE EXISTS (
        SELECT 1 FROM booked_meetings b
        WHERE b.organizer_id = NEW.organizer_id
          AND b.id <> NEW.id
          AND b.status = 'confirmed'
          AND b.start_ts < NEW.end_ts
          AND b.end_ts > NEW.start_ts
    );
END;
"#;

const BOOKING_COLUMNS: &str = "id, meeting_request_id, organizer_id, attendee_name, attendee_email, \
     start_ts, end_ts, status, notes, rescheduled_from, created_at";

const MEETING_COLUMNS: &str = "id, organizer_id, title, description, location, meeting_type, \
     duration_minutes, buffer_minutes, is_active, slug";

const EVENT_COLUMNS: &str =
    "id, user_id, title, start_ts, end_ts, timezone, is_all_day, recurrence_rule";

/// A SQLite database holding profiles, meeting requests, rules, events and bookings.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[instrument(skip(self, profile), fields(profile_id = %profile.id))]
    pub fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO profiles (id, email, full_name, timezone) VALUES (?1, ?2, ?3, ?4)",
                params![
                    profile.id.to_string(),
                    profile.email,
                    profile.full_name,
                    profile.timezone.name(),
                ],
            )
            .map_err(|e| map_write_error(e, "profile"))?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(slug = %request.slug))]
    pub fn insert_meeting_request(&self, request: &MeetingRequestConfig) -> StoreResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO meeting_requests (id, organizer_id, title, description, location, \
                 meeting_type, duration_minutes, buffer_minutes, is_active, slug)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    request.id.to_string(),
                    request.organizer_id.to_string(),
                    request.title,
                    request.description,
                    request.location,
                    request.meeting_type.as_str(),
                    request.duration_minutes,
                    request.buffer_minutes,
                    request.is_active,
                    request.slug,
                ],
            )
            .map_err(|e| map_write_error(e, "meeting request"))?;
        Ok(())
    }

    pub fn insert_rule(&self, rule: &AvailabilityRule) -> StoreResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO availability_slots \
                 (id, meeting_request_id, day_of_week, start_time, end_time, timezone)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    rule.id.to_string(),
                    rule.meeting_request_id.to_string(),
                    rule.day_of_week,
                    rule.start_time.format("%H:%M:%S").to_string(),
                    rule.end_time.format("%H:%M:%S").to_string(),
                    rule.timezone.map(|tz| tz.name()),
                ],
            )
            .map_err(|e| map_write_error(e, "availability rule"))?;
        Ok(())
    }

    /// Fails with [`StoreError::Invalid`] if the recurrence rule does not parse.
    pub fn insert_event(&self, event: &CalendarEvent) -> StoreResult<()> {
        validate_recurrence(event).map_err(|e| StoreError::Invalid(e.to_string()))?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO events \
                 (id, user_id, title, start_ts, end_ts, timezone, is_all_day, recurrence_rule)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.id.to_string(),
                    event.organizer_id.to_string(),
                    event.title,
                    event.start.timestamp(),
                    event.end.timestamp(),
                    event.timezone.name(),
                    event.is_all_day,
                    event.recurrence_rule,
                ],
            )
            .map_err(|e| map_write_error(e, "event"))?;
        Ok(())
    }

    pub fn set_meeting_active(&self, slug: &str, active: bool) -> StoreResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE meeting_requests SET is_active = ?1 WHERE slug = ?2",
            params![active, slug],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("meeting request {}", slug)));
        }
        Ok(())
    }
}

impl BookingStore for SqliteStore {
    fn meeting_request_by_slug(&self, slug: &str) -> StoreResult<Option<MeetingRequestConfig>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM meeting_requests WHERE slug = ?1", MEETING_COLUMNS),
                params![slug],
                MeetingRow::read,
            )
            .optional()?;
        row.map(MeetingRow::into_config).transpose()
    }

    fn meeting_request(&self, id: Uuid) -> StoreResult<Option<MeetingRequestConfig>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM meeting_requests WHERE id = ?1", MEETING_COLUMNS),
                params![id.to_string()],
                MeetingRow::read,
            )
            .optional()?;
        row.map(MeetingRow::into_config).transpose()
    }

    fn availability_rules(&self, meeting_request_id: Uuid) -> StoreResult<Vec<AvailabilityRule>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, meeting_request_id, day_of_week, start_time, end_time, timezone
             FROM availability_slots WHERE meeting_request_id = ?1
             ORDER BY day_of_week, start_time",
        )?;
        let rows = stmt
            .query_map(params![meeting_request_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, request_id, day, start, end, tz)| {
                Ok(AvailabilityRule {
                    id: parse_uuid(&id)?,
                    meeting_request_id: parse_uuid(&request_id)?,
                    day_of_week: day,
                    start_time: parse_time(&start)?,
                    end_time: parse_time(&end)?,
                    timezone: tz.as_deref().map(parse_tz).transpose()?,
                })
            })
            .collect()
    }

    fn profile(&self, organizer_id: Uuid) -> StoreResult<Option<Profile>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, email, full_name, timezone FROM profiles WHERE id = ?1",
                params![organizer_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, email, full_name, tz)| {
            Ok(Profile {
                id: parse_uuid(&id)?,
                email,
                full_name,
                timezone: parse_tz(&tz)?,
            })
        })
        .transpose()
    }

    fn calendar_events(
        &self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<CalendarEvent>> {
        select_events(&self.conn.lock(), organizer_id, window)
    }

    fn confirmed_bookings(
        &self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookedMeeting>> {
        select_confirmed(&self.conn.lock(), organizer_id, window)
    }

    fn booking(&self, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>> {
        select_booking(&self.conn.lock(), booking_id)
    }

    fn with_organizer_lock<T, E, F>(&self, organizer_id: Uuid, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn BookingTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut locked = SqliteTx {
            conn: &tx,
            organizer_id,
        };
        // Dropping `tx` without commit rolls back.
        let value = f(&mut locked)?;
        tx.commit().map_err(StoreError::from)?;
        debug!(%organizer_id, "committed locked section");
        Ok(value)
    }
}

/// Locked section over an open `IMMEDIATE` transaction.
struct SqliteTx<'a> {
    conn: &'a Connection,
    organizer_id: Uuid,
}

impl BookingTx for SqliteTx<'_> {
    fn calendar_events(
        &mut self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<CalendarEvent>> {
        select_events(self.conn, organizer_id, window)
    }

    fn confirmed_bookings(
        &mut self,
        organizer_id: Uuid,
        window: Interval,
    ) -> StoreResult<Vec<BookedMeeting>> {
        select_confirmed(self.conn, organizer_id, window)
    }

    fn booking(&mut self, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>> {
        select_booking(self.conn, booking_id)
    }

    fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<BookedMeeting> {
        let booked = booking.into_booked(Utc::now());
        self.conn
            .execute(
                &format!(
                    "INSERT INTO booked_meetings ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    BOOKING_COLUMNS
                ),
                params![
                    booked.id.to_string(),
                    booked.meeting_request_id.to_string(),
                    booked.organizer_id.to_string(),
                    booked.attendee.name,
                    booked.attendee.email,
                    booked.start.timestamp(),
                    booked.end.timestamp(),
                    booked.status.as_str(),
                    booked.notes,
                    booked.rescheduled_from.map(|id| id.to_string()),
                    booked.created_at.timestamp(),
                ],
            )
            .map_err(|e| map_booking_error(e, self.organizer_id))?;
        Ok(booked)
    }

    fn set_booking_status(&mut self, booking_id: Uuid, status: BookingStatus) -> StoreResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE booked_meetings SET status = ?1 WHERE id = ?2",
                params![status.as_str(), booking_id.to_string()],
            )
            .map_err(|e| map_booking_error(e, self.organizer_id))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("booking {}", booking_id)));
        }
        Ok(())
    }
}

fn select_events(
    conn: &Connection,
    organizer_id: Uuid,
    window: Interval,
) -> StoreResult<Vec<CalendarEvent>> {
    let margin = all_day_margin().num_seconds();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events
         WHERE user_id = ?1
           AND (
                (recurrence_rule IS NOT NULL AND start_ts < ?3)
             OR (is_all_day = 1 AND start_ts < ?3 + ?4 AND end_ts > ?2 - ?4)
             OR (start_ts < ?3 AND end_ts > ?2)
           )
         ORDER BY start_ts",
        EVENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![
                organizer_id.to_string(),
                window.start.timestamp(),
                window.end.timestamp(),
                margin,
            ],
            EventRow::read,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EventRow::into_event).collect()
}

fn select_confirmed(
    conn: &Connection,
    organizer_id: Uuid,
    window: Interval,
) -> StoreResult<Vec<BookedMeeting>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM booked_meetings
         WHERE organizer_id = ?1 AND status = 'confirmed'
           AND start_ts < ?3 AND end_ts > ?2
         ORDER BY start_ts",
        BOOKING_COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![
                organizer_id.to_string(),
                window.start.timestamp(),
                window.end.timestamp(),
            ],
            BookingRow::read,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(BookingRow::into_booking).collect()
}

fn select_booking(conn: &Connection, booking_id: Uuid) -> StoreResult<Option<BookedMeeting>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM booked_meetings WHERE id = ?1", BOOKING_COLUMNS),
            params![booking_id.to_string()],
            BookingRow::read,
        )
        .optional()?;
    row.map(BookingRow::into_booking).transpose()
}

/// Raw column values of a `meeting_requests` row.
struct MeetingRow {
    id: String,
    organizer_id: String,
    title: String,
    description: Option<String>,
    location: Option<String>,
    meeting_type: String,
    duration_minutes: u32,
    buffer_minutes: u32,
    is_active: bool,
    slug: String,
}

impl MeetingRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            organizer_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            location: row.get(4)?,
            meeting_type: row.get(5)?,
            duration_minutes: row.get(6)?,
            buffer_minutes: row.get(7)?,
            is_active: row.get(8)?,
            slug: row.get(9)?,
        })
    }

    fn into_config(self) -> StoreResult<MeetingRequestConfig> {
        let meeting_type = MeetingType::parse(&self.meeting_type)
            .ok_or_else(|| corrupt("meeting_type", &self.meeting_type))?;
        Ok(MeetingRequestConfig {
            id: parse_uuid(&self.id)?,
            organizer_id: parse_uuid(&self.organizer_id)?,
            title: self.title,
            description: self.description,
            location: self.location,
            meeting_type,
            duration_minutes: self.duration_minutes,
            buffer_minutes: self.buffer_minutes,
            is_active: self.is_active,
            slug: self.slug,
        })
    }
}

struct EventRow {
    id: String,
    user_id: String,
    title: String,
    start_ts: i64,
    end_ts: i64,
    timezone: String,
    is_all_day: bool,
    recurrence_rule: Option<String>,
}

impl EventRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            start_ts: row.get(3)?,
            end_ts: row.get(4)?,
            timezone: row.get(5)?,
            is_all_day: row.get(6)?,
            recurrence_rule: row.get(7)?,
        })
    }

    fn into_event(self) -> StoreResult<CalendarEvent> {
        Ok(CalendarEvent {
            id: parse_uuid(&self.id)?,
            organizer_id: parse_uuid(&self.user_id)?,
            title: self.title,
            start: parse_ts(self.start_ts)?,
            end: parse_ts(self.end_ts)?,
            timezone: parse_tz(&self.timezone)?,
            is_all_day: self.is_all_day,
            recurrence_rule: self.recurrence_rule,
        })
    }
}

struct BookingRow {
    id: String,
    meeting_request_id: String,
    organizer_id: String,
    attendee_name: String,
    attendee_email: String,
    start_ts: i64,
    end_ts: i64,
    status: String,
    notes: Option<String>,
    rescheduled_from: Option<String>,
    created_at: i64,
}

impl BookingRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            meeting_request_id: row.get(1)?,
            organizer_id: row.get(2)?,
            attendee_name: row.get(3)?,
            attendee_email: row.get(4)?,
            start_ts: row.get(5)?,
            end_ts: row.get(6)?,
            status: row.get(7)?,
            notes: row.get(8)?,
            rescheduled_from: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_booking(self) -> StoreResult<BookedMeeting> {
        let status =
            BookingStatus::parse(&self.status).ok_or_else(|| corrupt("status", &self.status))?;
        Ok(BookedMeeting {
            id: parse_uuid(&self.id)?,
            meeting_request_id: parse_uuid(&self.meeting_request_id)?,
            organizer_id: parse_uuid(&self.organizer_id)?,
            attendee: Attendee::new(self.attendee_name, self.attendee_email),
            start: parse_ts(self.start_ts)?,
            end: parse_ts(self.end_ts)?,
            status,
            notes: self.notes,
            rescheduled_from: self.rescheduled_from.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_ts(self.created_at)?,
        })
    }
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("corrupt {} value: {:?}", column, value))
}

fn parse_uuid(s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|_| corrupt("uuid", s))
}

fn parse_tz(s: &str) -> StoreResult<Tz> {
    s.parse::<Tz>().map_err(|_| corrupt("timezone", s))
}

fn parse_time(s: &str) -> StoreResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S").map_err(|_| corrupt("time", s))
}

fn parse_ts(ts: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| corrupt("timestamp", &ts.to_string()))
}

fn is_overlap_abort(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains(OVERLAP_MARKER))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn map_write_error(err: rusqlite::Error, what: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate(format!("{}: {}", what, err))
    } else {
        StoreError::from(err)
    }
}

fn map_booking_error(err: rusqlite::Error, organizer_id: Uuid) -> StoreError {
    if is_overlap_abort(&err) {
        StoreError::Conflict(organizer_id.to_string())
    } else {
        StoreError::from(err)
    }
}
