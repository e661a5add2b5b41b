//! The extraction-and-classification pipeline: parse, filter, classify, aggregate.

use chrono_tz::Tz;

use crate::aggregate::{Aggregation, aggregate};
use crate::classify::classify;
use crate::event::EventError;
use crate::parser::{ParseError, parse};
use crate::period::filter_period;
use crate::types::BillingPeriod;

/// Event counts for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// `VEVENT`s read successfully.
    pub parsed: usize,
    /// Events inside the billing period.
    pub in_period: usize,
    /// In-period events attributed to a customer.
    pub classified: usize,
    /// In-period events without a customer code.
    pub unclassified: usize,
    /// Classified events left out for inconsistent data.
    pub rejected: usize,
}

/// The outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct InvoiceRun {
    pub aggregation: Aggregation,
    /// Events dropped by the parser or the aggregator.
    pub skipped: Vec<EventError>,
    pub stats: RunStats,
}

/// Runs the full pipeline over a raw feed for one billing period.
pub fn build_invoices(
    raw_feed: &[u8],
    local_tz: Tz,
    period: BillingPeriod,
) -> Result<InvoiceRun, ParseError> {
    let feed = parse(raw_feed, local_tz)?;
    let mut stats = RunStats {
        parsed: feed.events.len(),
        ..RunStats::default()
    };

    let selected = filter_period(feed.events, period);
    stats.in_period = selected.len();

    let mut classified = Vec::with_capacity(selected.len());
    for event in selected {
        let label = event.label();
        match classify(event) {
            Some(event) => classified.push(event),
            None => {
                tracing::debug!(event = %label, "no customer code, skipping");
                stats.unclassified += 1;
            }
        }
    }
    stats.classified = classified.len();

    let aggregation = aggregate(classified, period);
    stats.rejected = aggregation.rejected.len();

    let mut skipped = feed.skipped;
    skipped.extend(aggregation.rejected.iter().cloned());

    tracing::info!(
        parsed = stats.parsed,
        in_period = stats.in_period,
        classified = stats.classified,
        unclassified = stats.unclassified,
        rejected = stats.rejected,
        customers = aggregation.datasets.len(),
        %period,
        "built invoice datasets"
    );

    Ok(InvoiceRun {
        aggregation,
        skipped,
        stats,
    })
}
