//! Billing period selection.

use chrono::NaiveDateTime;

use crate::event::Event;
use crate::types::BillingPeriod;

/// Returns whether `event` belongs to `period`.
///
/// An event is selected when its start or its end lies within the inclusive
/// period bounds. Events without an end are selected on their start alone.
pub fn in_period(event: &Event, period: BillingPeriod) -> bool {
    let (lower, upper) = period.bounds();
    let within = |t: NaiveDateTime| lower <= t && t <= upper;
    within(event.start) || event.end.is_some_and(within)
}

/// Keeps the events that belong to `period`, preserving input order.
pub fn filter_period(events: impl IntoIterator<Item = Event>, period: BillingPeriod) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| in_period(event, period))
        .collect()
}
