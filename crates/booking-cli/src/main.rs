//! `slotbook` CLI: manage booking links and confirm meetings against a SQLite store.
//!
//! ## Usage
//!
//! ```sh
//! # Create the database
//! slotbook --db cal.db init
//!
//! # Add an organizer and a booking link with Monday hours
//! slotbook --db cal.db add-organizer --email ada@example.com --timezone Europe/London
//! slotbook --db cal.db create-meeting --organizer <ID> --title "Intro call"
//! slotbook --db cal.db add-rule --slug intro-call-x1y2z3 --day 1 --start 09:00 --end 12:00
//!
//! # Query and book
//! slotbook --db cal.db slots --slug intro-call-x1y2z3 \
//!     --from 2026-03-02T00:00:00Z --to 2026-03-09T00:00:00Z
//! slotbook --db cal.db book --slug intro-call-x1y2z3 \
//!     --start 2026-03-02T09:00:00Z --end 2026-03-02T09:30:00Z \
//!     --name Grace --email grace@example.com
//! ```
//!
//! Results are JSON on stdout. A booking operation that fails prints
//! `{"error": "<Code>"}` and exits with status 2; usage and setup errors exit 1.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{anyhow, Context, Result};
use booking_engine::api::{
    self, format_instant, parse_instant, AvailabilityQuery, ConfirmRequest, ConfirmResponse,
    ErrorBody,
};
use booking_engine::slug::generate_slug;
use booking_engine::{
    AvailabilityRule, BookedMeeting, BookingError, BookingStore, CalendarEvent, ErrorCode,
    Interval, MeetingRequestConfig, MeetingType, Profile, Resolver, ResolverConfig, SqliteStore,
};
use chrono::NaiveTime;
use chrono_tz::Tz;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Exit status for a booking operation rejected by the resolver.
const EXIT_BOOKING_FAILED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "slotbook",
    version,
    about = "Publish availability and book meetings without double-booking"
)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "slotbook.db")]
    db: PathBuf,

    /// Resolver settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Register an organizer
    AddOrganizer {
        #[arg(long)]
        email: String,
        /// IANA timezone, e.g. "America/New_York"
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Publish a booking link for an organizer
    CreateMeeting {
        #[arg(long)]
        organizer: Uuid,
        #[arg(long)]
        title: String,
        /// Public slug (generated from the title if omitted)
        #[arg(long)]
        slug: Option<String>,
        #[arg(long, default_value_t = booking_engine::model::DEFAULT_DURATION_MINUTES)]
        duration: u32,
        #[arg(long, default_value_t = booking_engine::model::DEFAULT_BUFFER_MINUTES)]
        buffer: u32,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// in-person, video or phone
        #[arg(long, default_value = "video")]
        meeting_type: String,
    },
    /// Enable or disable a booking link
    SetActive {
        #[arg(long)]
        slug: String,
        #[arg(long, action = ArgAction::Set)]
        active: bool,
    },
    /// Add a weekly availability window to a booking link
    AddRule {
        #[arg(long)]
        slug: String,
        /// 0 = Sunday … 6 = Saturday
        #[arg(long)]
        day: u8,
        /// Local start time, HH:MM
        #[arg(long)]
        start: String,
        /// Local end time, HH:MM
        #[arg(long)]
        end: String,
        /// Defaults to the organizer's timezone
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Add a calendar event that blocks the organizer's time
    AddEvent {
        #[arg(long)]
        organizer: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[arg(long)]
        all_day: bool,
        /// RRULE body, e.g. "FREQ=WEEKLY;BYDAY=MO"
        #[arg(long)]
        rrule: Option<String>,
    },
    /// List bookable slots starting in [from, to)
    Slots {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Confirm a slot
    Book {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel a confirmed booking
    Cancel {
        #[arg(long)]
        booking: Uuid,
    },
    /// Move a confirmed booking to another slot
    Reschedule {
        #[arg(long)]
        booking: Uuid,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => ResolverConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ResolverConfig::default(),
    };
    let store = open_store(&cli.db)?;
    debug!(db = %cli.db.display(), "opened store");

    match cli.command {
        Commands::Init => {
            print_json(&json!({ "db": cli.db.display().to_string() }))?;
        }
        Commands::AddOrganizer {
            email,
            timezone,
            name,
        } => {
            let mut profile = Profile::new(email, parse_tz(&timezone)?);
            profile.full_name = name;
            store
                .insert_profile(&profile)
                .context("Failed to add organizer")?;
            print_json(&json!({ "organizerId": profile.id }))?;
        }
        Commands::CreateMeeting {
            organizer,
            title,
            slug,
            duration,
            buffer,
            description,
            location,
            meeting_type,
        } => {
            if duration == 0 {
                anyhow::bail!("--duration must be at least 1 minute");
            }
            let slug = slug.unwrap_or_else(|| generate_slug(&title));
            let mut request = MeetingRequestConfig::new(organizer, title, slug);
            request.duration_minutes = duration;
            request.buffer_minutes = buffer;
            request.description = description;
            request.location = location;
            request.meeting_type = MeetingType::parse(&meeting_type).ok_or_else(|| {
                anyhow!(
                    "Unknown meeting type: '{}'. Expected in-person, video or phone",
                    meeting_type
                )
            })?;
            store
                .insert_meeting_request(&request)
                .context("Failed to create meeting request")?;
            print_json(&json!({
                "meetingRequestId": request.id,
                "slug": request.slug,
            }))?;
        }
        Commands::SetActive { slug, active } => {
            store
                .set_meeting_active(&slug, active)
                .with_context(|| format!("Failed to update meeting request: {}", slug))?;
            print_json(&json!({ "slug": slug, "isActive": active }))?;
        }
        Commands::AddRule {
            slug,
            day,
            start,
            end,
            timezone,
        } => {
            let request = store
                .meeting_request_by_slug(&slug)?
                .ok_or_else(|| anyhow!("No meeting request with slug '{}'", slug))?;
            let mut rule =
                AvailabilityRule::new(request.id, day, parse_time(&start)?, parse_time(&end)?);
            rule.timezone = timezone.as_deref().map(parse_tz).transpose()?;
            store
                .insert_rule(&rule)
                .context("Failed to add availability rule")?;
            print_json(&json!({ "ruleId": rule.id }))?;
        }
        Commands::AddEvent {
            organizer,
            title,
            start,
            end,
            timezone,
            all_day,
            rrule,
        } => {
            let mut event = CalendarEvent::new(
                organizer,
                title,
                parse_cli_instant(&start)?,
                parse_cli_instant(&end)?,
            );
            event.timezone = parse_tz(&timezone)?;
            event.is_all_day = all_day;
            event.recurrence_rule = rrule;
            store.insert_event(&event).context("Failed to add event")?;
            print_json(&json!({ "eventId": event.id }))?;
        }
        Commands::Slots { slug, from, to } => {
            let resolver = Resolver::new(store, config);
            let query = AvailabilityQuery {
                slug,
                range_start: from,
                range_end: to,
            };
            match api::query_availability(&resolver, &query) {
                Ok(slots) => print_json(&slots)?,
                Err(body) => fail(&body)?,
            }
        }
        Commands::Book {
            slug,
            start,
            end,
            name,
            email,
            notes,
        } => {
            let resolver = Resolver::new(store, config);
            let request = ConfirmRequest {
                slug,
                slot_start: start,
                slot_end: end,
                attendee_name: name,
                attendee_email: email,
                notes,
            };
            match api::confirm_booking(&resolver, &request) {
                ConfirmResponse::Failed(body) => fail(&body)?,
                confirmed => print_json(&confirmed)?,
            }
        }
        Commands::Cancel { booking } => {
            let resolver = Resolver::new(store, config);
            report(resolver.cancel_booking(booking))?;
        }
        Commands::Reschedule {
            booking,
            start,
            end,
        } => {
            let resolver = Resolver::new(store, config);
            let slot = match (parse_instant(&start), parse_instant(&end)) {
                (Some(start), Some(end)) => Interval::new(start, end),
                _ => fail(&ErrorBody {
                    error: ErrorCode::InvalidSlot,
                })?,
            };
            report(resolver.reschedule_booking(booking, slot))?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = if verbose > 0 { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("Failed to open database: {}", path.display()))
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| anyhow!("Unknown timezone: '{}'", name))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .with_context(|| format!("Invalid time '{}', expected HH:MM", s))
}

fn parse_cli_instant(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_instant(s).ok_or_else(|| anyhow!("Invalid instant '{}', expected RFC 3339", s))
}

/// Print a booking record, or the error body and exit 2.
fn report(result: Result<BookedMeeting, BookingError>) -> Result<()> {
    match result {
        Ok(booking) => print_json(&json!({
            "bookingId": booking.id,
            "status": booking.status,
            "start": format_instant(booking.start),
            "end": format_instant(booking.end),
            "rescheduledFrom": booking.rescheduled_from,
        })),
        Err(err) => {
            debug!(error = %err, "booking operation rejected");
            fail(&ErrorBody::from(&err))
        }
    }
}

fn fail<T>(body: &ErrorBody) -> Result<T> {
    print_json(body)?;
    process::exit(EXIT_BOOKING_FAILED);
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
