//! Core domain logic for calendar-based billing.
//!
//! This crate contains the fundamental types and logic for:
//! - Parsing: turning an iCalendar feed into normalized local-time events
//! - Period selection: picking the events of one billing month
//! - Classification: reading the customer code from an event description
//! - Aggregation: folding classified events into per-customer invoice datasets

mod aggregate;
pub mod classify;
mod duration;
mod event;
pub mod parser;
pub mod period;
mod pipeline;
mod types;

pub use aggregate::{Aggregation, InvoiceDataset, aggregate};
pub use classify::classify;
pub use duration::format_hours_minutes;
pub use event::{ClassifiedEvent, Event, EventError};
pub use parser::{ParseError, ParsedFeed, parse};
pub use period::filter_period;
pub use pipeline::{InvoiceRun, RunStats, build_invoices};
pub use types::{BillingPeriod, CustomerCode, MAX_YEAR, MIN_YEAR, ValidationError};

pub use chrono_tz::Tz;
