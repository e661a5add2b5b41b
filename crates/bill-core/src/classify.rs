//! Customer attribution from event descriptions.

use std::sync::LazyLock;

use regex::Regex;

use crate::event::{ClassifiedEvent, Event};
use crate::types::CustomerCode;

/// Three uppercase ASCII letters and a colon, anchored at the start.
static CUSTOMER_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A([A-Z]{3}):(.*)\z").unwrap());

/// Splits a description into its customer code and the remaining text.
///
/// Leading whitespace before the code is ignored; the remainder is trimmed.
/// Returns `None` unless the description starts with `XYZ:`.
pub fn split_customer_prefix(description: &str) -> Option<(CustomerCode, &str)> {
    let caps = CUSTOMER_PREFIX_RE.captures(description.trim_start())?;
    let code = CustomerCode::new(&caps[1]).ok()?;
    let rest = caps.get(2).map_or("", |m| m.as_str().trim());
    Some((code, rest))
}

/// Attributes an event to a customer, or returns `None` for unclassified events.
pub fn classify(event: Event) -> Option<ClassifiedEvent> {
    let (customer, rest) = split_customer_prefix(&event.description)?;
    let clean_description = rest.to_string();
    let duration = event.duration();
    Some(ClassifiedEvent {
        event,
        customer,
        clean_description,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn event_with_description(description: &str) -> Event {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Event {
            uid: None,
            start,
            end: Some(start + Duration::minutes(90)),
            all_day: false,
            summary: "Work".to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn extracts_code_and_cleans_description() {
        let classified = classify(event_with_description("ABC: text")).unwrap();
        assert_eq!(classified.customer.as_str(), "ABC");
        assert_eq!(classified.clean_description, "text");
        assert_eq!(classified.duration, Some(Duration::minutes(90)));
    }

    #[test]
    fn lowercase_code_is_unclassified() {
        assert!(classify(event_with_description("abc: text")).is_none());
    }

    #[test]
    fn code_later_in_text_is_unclassified() {
        assert!(classify(event_with_description("text ABC: more")).is_none());
    }

    #[test]
    fn empty_description_is_unclassified() {
        assert!(classify(event_with_description("")).is_none());
    }

    #[test]
    fn wrong_length_codes_are_unclassified() {
        assert!(classify(event_with_description("AB: text")).is_none());
        assert!(classify(event_with_description("ABCD: text")).is_none());
        assert!(classify(event_with_description("ABC text")).is_none());
        assert!(classify(event_with_description("ABC :text")).is_none());
    }

    #[test]
    fn leading_whitespace_before_code_is_ignored() {
        let classified = classify(event_with_description("  \nXYZ:  review  ")).unwrap();
        assert_eq!(classified.customer.as_str(), "XYZ");
        assert_eq!(classified.clean_description, "review");
    }

    #[test]
    fn multiline_remainder_is_kept() {
        let (code, rest) = split_customer_prefix("ABC: first\nsecond\n").unwrap();
        assert_eq!(code.as_str(), "ABC");
        assert_eq!(rest, "first\nsecond");
    }

    #[test]
    fn code_only_description_has_empty_remainder() {
        let classified = classify(event_with_description("ABC:")).unwrap();
        assert_eq!(classified.clean_description, "");
        assert_eq!(classified.display_text(), "Work");
    }
}
