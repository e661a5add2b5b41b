//! Per-customer aggregation into invoice datasets.
//!
//! # Algorithm Summary
//!
//! 1. Reject events whose end precedes their start
//! 2. Group the remaining events by customer code
//! 3. Stable-sort each group by start time
//! 4. Sum the known durations into a per-customer total

use std::collections::HashMap;

use chrono::Duration;
use serde::Serialize;

use crate::duration::format_hours_minutes;
use crate::event::{ClassifiedEvent, EventError};
use crate::types::{BillingPeriod, CustomerCode};

/// The billable events of one customer in one billing period.
///
/// Only [`aggregate`] creates datasets; consumers get read-only access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDataset {
    customer: CustomerCode,
    period: BillingPeriod,
    events: Vec<ClassifiedEvent>,
    #[serde(rename = "total_minutes", serialize_with = "serialize_total")]
    total: Duration,
}

fn serialize_total<S>(total: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(total.num_minutes())
}

impl InvoiceDataset {
    /// The customer billed.
    pub const fn customer(&self) -> &CustomerCode {
        &self.customer
    }

    /// The billing period.
    pub const fn period(&self) -> BillingPeriod {
        self.period
    }

    /// Events sorted by start time, ascending.
    pub fn events(&self) -> &[ClassifiedEvent] {
        &self.events
    }

    /// Sum of all known event durations.
    pub const fn total_duration(&self) -> Duration {
        self.total
    }

    /// The total formatted as `HH:MM`.
    pub fn total_hours_minutes(&self) -> String {
        format_hours_minutes(self.total)
    }
}

/// Result of aggregation.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// One dataset per customer. Iteration order is unspecified.
    pub datasets: HashMap<CustomerCode, InvoiceDataset>,

    /// Events excluded because their data was inconsistent.
    pub rejected: Vec<EventError>,
}

impl Aggregation {
    /// Datasets ordered by customer code.
    pub fn sorted(&self) -> Vec<&InvoiceDataset> {
        let mut datasets: Vec<_> = self.datasets.values().collect();
        datasets.sort_by(|a, b| a.customer.cmp(&b.customer));
        datasets
    }

    /// Consumes the datasets, ordered by customer code.
    pub fn into_sorted(self) -> Vec<InvoiceDataset> {
        let mut datasets: Vec<_> = self.datasets.into_values().collect();
        datasets.sort_by(|a, b| a.customer.cmp(&b.customer));
        datasets
    }
}

/// Groups classified events into one [`InvoiceDataset`] per customer.
///
/// Events whose end precedes their start are not clamped; they are left out
/// and reported in [`Aggregation::rejected`].
pub fn aggregate(
    events: impl IntoIterator<Item = ClassifiedEvent>,
    period: BillingPeriod,
) -> Aggregation {
    let mut groups: HashMap<CustomerCode, Vec<ClassifiedEvent>> = HashMap::new();
    let mut rejected = Vec::new();

    for event in events {
        if let Some(err) = check_consistency(&event) {
            tracing::warn!(error = %err, customer = %event.customer, "excluding event");
            rejected.push(err);
            continue;
        }
        groups.entry(event.customer.clone()).or_default().push(event);
    }

    let datasets = groups
        .into_iter()
        .filter(|(_, events)| !events.is_empty())
        .map(|(customer, mut events)| {
            events.sort_by_key(|e| e.event.start);
            let total = events
                .iter()
                .filter_map(|e| e.duration)
                .fold(Duration::zero(), |acc, d| acc + d);
            tracing::debug!(
                customer = %customer,
                events = events.len(),
                total = %format_hours_minutes(total),
                "aggregated customer"
            );
            let dataset = InvoiceDataset {
                customer: customer.clone(),
                period,
                events,
                total,
            };
            (customer, dataset)
        })
        .collect();

    Aggregation { datasets, rejected }
}

fn check_consistency(event: &ClassifiedEvent) -> Option<EventError> {
    let end = event.event.end?;
    (end < event.event.start).then(|| EventError::DataConsistency {
        event: event.event.label(),
        start: event.event.start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::event::Event;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn classified(uid: &str, description: &str, start: NaiveDateTime, minutes: Option<i64>) -> ClassifiedEvent {
        classify(Event {
            uid: Some(uid.to_string()),
            start,
            end: minutes.map(|m| start + Duration::minutes(m)),
            all_day: false,
            summary: String::new(),
            description: description.to_string(),
        })
        .unwrap()
    }

    fn march() -> BillingPeriod {
        BillingPeriod::new(3, 2024).unwrap()
    }

    fn code(s: &str) -> CustomerCode {
        CustomerCode::new(s).unwrap()
    }

    fn uids(dataset: &InvoiceDataset) -> Vec<&str> {
        dataset
            .events()
            .iter()
            .filter_map(|e| e.event.uid.as_deref())
            .collect()
    }

    #[test]
    fn single_event_duration() {
        let result = aggregate(vec![classified("a", "ABC: x", at(1, 9, 0), Some(90))], march());
        let dataset = &result.datasets[&code("ABC")];
        assert_eq!(dataset.total_hours_minutes(), "01:30");
    }

    #[test]
    fn sums_durations_per_customer() {
        let events = vec![
            classified("a", "ABC: one", at(1, 9, 0), Some(90)),
            classified("b", "ABC: two", at(2, 9, 0), Some(45)),
            classified("c", "ABC: three", at(3, 9, 0), Some(15)),
        ];
        let result = aggregate(events, march());
        let dataset = &result.datasets[&code("ABC")];
        assert_eq!(dataset.total_duration(), Duration::minutes(150));
        assert_eq!(dataset.total_hours_minutes(), "02:30");
    }

    #[test]
    fn open_ended_events_do_not_count_towards_total() {
        let events = vec![
            classified("a", "ABC: one", at(1, 9, 0), Some(30)),
            classified("b", "ABC: two", at(2, 9, 0), None),
        ];
        let result = aggregate(events, march());
        let dataset = &result.datasets[&code("ABC")];
        assert_eq!(dataset.events().len(), 2);
        assert_eq!(dataset.total_duration(), Duration::minutes(30));
    }

    #[test]
    fn groups_by_customer_and_sorts_by_start() {
        let events = vec![
            classified("late", "ABC: late", at(20, 9, 0), Some(60)),
            classified("xyz", "XYZ: other", at(5, 9, 0), Some(60)),
            classified("early", "ABC: early", at(2, 9, 0), Some(60)),
        ];
        let result = aggregate(events, march());
        assert_eq!(result.datasets.len(), 2);
        assert_eq!(uids(&result.datasets[&code("ABC")]), vec!["early", "late"]);
        assert_eq!(uids(&result.datasets[&code("XYZ")]), vec!["xyz"]);
        assert_eq!(result.datasets[&code("XYZ")].period(), march());
    }

    #[test]
    fn ties_keep_encounter_order() {
        let events = vec![
            classified("first", "ABC: a", at(4, 9, 0), Some(10)),
            classified("second", "ABC: b", at(4, 9, 0), Some(20)),
            classified("third", "ABC: c", at(4, 9, 0), Some(30)),
        ];
        let result = aggregate(events, march());
        assert_eq!(uids(&result.datasets[&code("ABC")]), vec!["first", "second", "third"]);
    }

    #[test]
    fn rejects_end_before_start() {
        let events = vec![
            classified("bad", "ABC: bad", at(4, 9, 0), Some(-30)),
            classified("good", "ABC: good", at(4, 10, 0), Some(30)),
        ];
        let result = aggregate(events, march());
        assert_eq!(uids(&result.datasets[&code("ABC")]), vec!["good"]);
        assert_eq!(
            result.rejected,
            vec![EventError::DataConsistency {
                event: "bad".to_string(),
                start: at(4, 9, 0),
                end: at(4, 8, 30),
            }]
        );
    }

    #[test]
    fn customer_with_only_rejected_events_is_absent() {
        let events = vec![classified("bad", "QQQ: bad", at(4, 9, 0), Some(-1))];
        let result = aggregate(events, march());
        assert!(result.datasets.is_empty());
        assert_eq!(result.rejected.len(), 1);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let events = vec![
            classified("a", "ABC: one", at(3, 9, 0), Some(90)),
            classified("b", "XYZ: two", at(1, 9, 0), Some(45)),
            classified("c", "ABC: three", at(2, 9, 0), Some(15)),
        ];
        let first = aggregate(events.clone(), march());
        let second = aggregate(events.clone(), march());
        assert_eq!(first.datasets, second.datasets);

        let mut reversed = events;
        reversed.reverse();
        let third = aggregate(reversed, march());
        assert_eq!(first.datasets, third.datasets);
    }

    #[test]
    fn sorted_orders_by_customer_code() {
        let events = vec![
            classified("z", "ZZZ: z", at(1, 9, 0), Some(1)),
            classified("a", "AAA: a", at(1, 9, 0), Some(1)),
            classified("m", "MMM: m", at(1, 9, 0), Some(1)),
        ];
        let result = aggregate(events, march());
        let codes: Vec<_> = result.sorted().iter().map(|d| d.customer().as_str()).collect();
        assert_eq!(codes, vec!["AAA", "MMM", "ZZZ"]);

        let owned: Vec<_> = result
            .into_sorted()
            .into_iter()
            .map(|d| d.customer().to_string())
            .collect();
        assert_eq!(owned, vec!["AAA", "MMM", "ZZZ"]);
    }

    #[test]
    fn dataset_serializes_total_in_minutes() {
        let result = aggregate(vec![classified("a", "ABC: x", at(1, 9, 0), Some(90))], march());
        let json = serde_json::to_value(&result.datasets[&code("ABC")]).unwrap();
        assert_eq!(json["customer"], "ABC");
        assert_eq!(json["total_minutes"], 90);
        assert_eq!(json["period"]["month"], 3);
        assert_eq!(json["events"][0]["clean_description"], "x");
    }
}
