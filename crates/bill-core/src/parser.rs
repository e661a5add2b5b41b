//! iCalendar feed parsing.
//!
//! Turns raw feed bytes into normalized [`Event`]s. All timestamps pass
//! through [`to_local_naive`] exactly once, so everything downstream works
//! with naive local time and never mixes aware and naive values.

use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, EventLike};
use thiserror::Error;

use crate::event::{Event, EventError};

/// The feed as a whole could not be read as calendar data.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The feed was not valid UTF-8.
    #[error("calendar feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The feed does not look like a `VCALENDAR` document.
    #[error("calendar feed is not a VCALENDAR document: {reason}")]
    NotACalendar { reason: &'static str },

    /// The iCalendar grammar rejected the content.
    #[error("invalid calendar data: {0}")]
    Syntax(String),
}

/// The events extracted from a feed, in feed order, plus the entries that
/// had to be skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub events: Vec<Event>,
    pub skipped: Vec<EventError>,
}

/// Parses a raw iCalendar feed.
///
/// Only `VEVENT` components are considered. An event without a readable
/// `DTSTART` is skipped and reported in [`ParsedFeed::skipped`]; any
/// feed-level problem fails the whole parse.
pub fn parse(raw: &[u8], local_tz: Tz) -> Result<ParsedFeed, ParseError> {
    let text = std::str::from_utf8(raw)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    check_envelope(text)?;

    let calendar = Calendar::from_str(text).map_err(ParseError::Syntax)?;

    let mut feed = ParsedFeed::default();
    let mut position = 0usize;
    for component in &calendar.components {
        let CalendarComponent::Event(vevent) = component else {
            continue;
        };
        position += 1;
        match extract_event(vevent, position, local_tz) {
            Ok(event) => feed.events.push(event),
            Err(err) => {
                tracing::warn!(error = %err, "skipping calendar entry");
                feed.skipped.push(err);
            }
        }
    }

    tracing::debug!(
        events = feed.events.len(),
        skipped = feed.skipped.len(),
        "parsed calendar feed"
    );
    Ok(feed)
}

/// Requires the content to be wrapped in `BEGIN:VCALENDAR` ... `END:VCALENDAR`.
///
/// This rejects arbitrary text and truncated downloads, which the grammar
/// parser alone may accept as an empty calendar.
fn check_envelope(text: &str) -> Result<(), ParseError> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let first = lines.next().ok_or(ParseError::NotACalendar {
        reason: "feed is empty",
    })?;
    if !first.eq_ignore_ascii_case("BEGIN:VCALENDAR") {
        return Err(ParseError::NotACalendar {
            reason: "feed does not start with BEGIN:VCALENDAR",
        });
    }
    let last = lines.last().unwrap_or(first);
    if !last.eq_ignore_ascii_case("END:VCALENDAR") {
        return Err(ParseError::NotACalendar {
            reason: "feed does not end with END:VCALENDAR",
        });
    }
    Ok(())
}

fn extract_event(
    vevent: &icalendar::Event,
    position: usize,
    local_tz: Tz,
) -> Result<Event, EventError> {
    let uid = vevent.get_uid().map(str::to_string);
    let name = || uid.clone().unwrap_or_else(|| format!("#{position}"));

    let (start, all_day) = vevent
        .get_start()
        .and_then(|dpt| to_local_naive(dpt, local_tz))
        .ok_or_else(|| EventError::MissingField {
            event: name(),
            field: "DTSTART",
        })?;

    let end = match vevent.get_end() {
        Some(dpt) => {
            let end = to_local_naive(dpt, local_tz).map(|(end, _)| end);
            if end.is_none() {
                tracing::warn!(event = %name(), "ignoring unreadable DTEND");
            }
            end
        }
        None => vevent.property_value("DURATION").and_then(|value| {
            let end = parse_duration(value).and_then(|d| start.checked_add_signed(d));
            if end.is_none() {
                tracing::warn!(event = %name(), value, "ignoring unreadable DURATION");
            }
            end
        }),
    };

    Ok(Event {
        uid,
        start,
        end,
        all_day,
        summary: vevent.get_summary().unwrap_or_default().to_string(),
        description: vevent.get_description().unwrap_or_default().to_string(),
    })
}

/// Normalizes a calendar timestamp to naive time in `local_tz`.
///
/// - date-only values become local midnight (flagged `true`)
/// - UTC values are converted to `local_tz`
/// - `TZID` values are resolved in their zone, then converted to `local_tz`
/// - floating values are already local and pass through unchanged
///
/// Returns `None` only when the value cannot be placed on the timeline.
pub fn to_local_naive(value: DatePerhapsTime, local_tz: Tz) -> Option<(NaiveDateTime, bool)> {
    match value {
        DatePerhapsTime::Date(date) => Some((date.and_time(NaiveTime::MIN), true)),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Some((naive, false)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(utc)) => {
            Some((utc.with_timezone(&local_tz).naive_local(), false))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let Some(zone) = resolve_tzid(&tzid) else {
                tracing::warn!(tzid = %tzid, "unknown TZID, treating time as local");
                return Some((date_time, false));
            };
            let utc = resolve_local(zone, date_time)?;
            Some((utc.with_timezone(&local_tz).naive_local(), false))
        }
    }
}

/// Looks up an IANA zone, tolerating quoting and the `/vendor/` prefixes some
/// producers put in front of the zone name.
fn resolve_tzid(tzid: &str) -> Option<Tz> {
    let trimmed = tzid.trim().trim_matches('"');
    if let Ok(zone) = trimmed.parse::<Tz>() {
        return Some(zone);
    }
    // e.g. "/mozilla.org/20050126_1/Europe/Berlin"
    let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    (1..parts.len())
        .rev()
        .find_map(|skip| parts[parts.len() - skip..].join("/").parse::<Tz>().ok())
}

/// Places a wall-clock time of `zone` on the timeline.
///
/// Ambiguous times (DST fall-back) pick the earlier instant; times inside a
/// spring-forward gap are moved forward by one hour.
fn resolve_local(zone: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => zone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Parses an RFC 5545 `dur-value` such as `PT1H30M`, `P1D` or `-P2W`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match *value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };
    let rest = rest.strip_prefix(['P', 'p'])?;
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    let mut in_time = false;
    let mut digits = String::new();
    let mut saw_component = false;
    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => digits.push(c),
            'T' if !in_time && digits.is_empty() => in_time = true,
            unit => {
                let n: i64 = digits.parse().ok()?;
                digits.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n)?,
                    ('D', false) => Duration::try_days(n)?,
                    ('H', true) => Duration::try_hours(n)?,
                    ('M', true) => Duration::try_minutes(n)?,
                    ('S', true) => Duration::try_seconds(n)?,
                    _ => return None,
                };
                total = total.checked_add(&part)?;
                saw_component = true;
            }
        }
    }
    if !digits.is_empty() || !saw_component {
        return None;
    }
    Some(if negative { -total } else { total })
}
