//! Duration formatting.

use chrono::Duration;

/// Formats a duration as zero-padded `HH:MM`.
///
/// Whole minutes only: any sub-minute remainder is truncated. Hours are not
/// wrapped at 24. Negative durations are treated as zero.
pub fn format_hours_minutes(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    format!("{hours:02}:{minutes:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_hours_minutes(Duration::minutes(90)), "01:30");
        assert_eq!(format_hours_minutes(Duration::minutes(150)), "02:30");
        assert_eq!(format_hours_minutes(Duration::zero()), "00:00");
    }

    #[test]
    fn truncates_seconds() {
        assert_eq!(format_hours_minutes(Duration::seconds(45 * 60 + 59)), "00:45");
    }

    #[test]
    fn does_not_wrap_at_a_day() {
        assert_eq!(format_hours_minutes(Duration::hours(31) + Duration::minutes(5)), "31:05");
    }

    #[test]
    fn negative_is_zero() {
        assert_eq!(format_hours_minutes(Duration::minutes(-5)), "00:00");
    }
}
