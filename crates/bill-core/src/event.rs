//! Normalized calendar events.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::types::CustomerCode;

/// One calendar occurrence, normalized to naive local time.
///
/// Every timestamp has already passed through the parser's local-time
/// normalization, so `start` and `end` are directly comparable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// The `UID` of the source entry, if present.
    pub uid: Option<String>,
    /// Local start time. Date-only entries start at local midnight.
    pub start: NaiveDateTime,
    /// Local end time; absent when the entry has neither `DTEND` nor `DURATION`.
    pub end: Option<NaiveDateTime>,
    /// Whether `DTSTART` was a date without a time of day.
    pub all_day: bool,
    /// Short free text, possibly empty.
    pub summary: String,
    /// Free text that may begin with a customer-code marker.
    pub description: String,
}

impl Event {
    /// Returns `end - start`, or `None` without an end.
    ///
    /// The result may be negative for inconsistent source data.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// A short label for log messages: the UID when known, else the start time.
    pub fn label(&self) -> String {
        self.uid
            .clone()
            .unwrap_or_else(|| self.start.format("%Y-%m-%dT%H:%M").to_string())
    }
}

/// An event attributed to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedEvent {
    /// The underlying event.
    #[serde(flatten)]
    pub event: Event,
    /// The customer the event is billed to.
    pub customer: CustomerCode,
    /// The description with the customer-code marker stripped and trimmed.
    pub clean_description: String,
    /// `end - start`, when the event has an end.
    #[serde(serialize_with = "serialize_minutes")]
    pub duration: Option<Duration>,
}

impl ClassifiedEvent {
    /// Text to show for this event: the cleaned description, or the summary
    /// when the description carried nothing besides the code.
    pub fn display_text(&self) -> &str {
        if self.clean_description.is_empty() {
            &self.event.summary
        } else {
            &self.clean_description
        }
    }
}

#[allow(clippy::ref_option)] // serde passes a reference to the field
fn serialize_minutes<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match duration {
        Some(d) => serializer.serialize_some(&d.num_minutes()),
        None => serializer.serialize_none(),
    }
}

/// A problem with a single event. The event is skipped; the run continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// A required property was missing or unreadable.
    #[error("event {event} is missing required field {field}")]
    MissingField {
        /// UID, or position in the feed when the entry has no UID.
        event: String,
        field: &'static str,
    },

    /// The stored end precedes the start.
    #[error("event {event} ends at {end} before it starts at {start}")]
    DataConsistency {
        event: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}
