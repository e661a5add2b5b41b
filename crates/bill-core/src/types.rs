//! Core type definitions with validation.

use std::fmt;

use chrono::{Duration, Month, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest year accepted for a billing period.
pub const MIN_YEAR: i32 = 2000;

/// Highest year accepted for a billing period.
pub const MAX_YEAR: i32 = 2100;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The customer code was not three uppercase ASCII letters.
    #[error("customer code must be exactly three uppercase letters, got {value:?}")]
    InvalidCustomerCode { value: String },

    /// The month was outside 1..=12.
    #[error("month must be between 1 and 12, got {value}")]
    MonthOutOfRange { value: u32 },

    /// The year was outside the accepted range.
    #[error("year must be between {MIN_YEAR} and {MAX_YEAR}, got {value}")]
    YearOutOfRange { value: i32 },
}

/// A validated customer code.
///
/// Customer codes are exactly three uppercase ASCII letters (e.g. `ABC`).
/// They are embedded at the start of an event description as `ABC: ...`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerCode(String);

impl CustomerCode {
    /// Length of every customer code.
    pub const LEN: usize = 3;

    /// Creates a new code after validation.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.len() != Self::LEN || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCustomerCode { value: code });
        }
        Ok(Self(code))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CustomerCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CustomerCode> for String {
    fn from(code: CustomerCode) -> Self {
        code.0
    }
}

impl fmt::Display for CustomerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CustomerCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for CustomerCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A billing period: one calendar month of one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BillingPeriod {
    month: u32,
    year: i32,
}

impl BillingPeriod {
    /// Creates a billing period after validating month and year.
    pub const fn new(month: u32, year: i32) -> Result<Self, ValidationError> {
        if month < 1 || month > 12 {
            return Err(ValidationError::MonthOutOfRange { value: month });
        }
        if year < MIN_YEAR || year > MAX_YEAR {
            return Err(ValidationError::YearOutOfRange { value: year });
        }
        Ok(Self { month, year })
    }

    /// The month, 1..=12.
    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// The year.
    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// First day of the period.
    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        // Month and year were validated on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following period, rolling December over into January.
    #[must_use]
    pub fn next_first_day(self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
    }

    /// Inclusive bounds `[first day 00:00:00, last day 23:59:59]`.
    ///
    /// The end bound is one second before midnight of the next month's first day.
    #[must_use]
    pub fn bounds(self) -> (NaiveDateTime, NaiveDateTime) {
        let start = self.first_day().and_time(NaiveTime::MIN);
        let end = self.next_first_day().and_time(NaiveTime::MIN) - Duration::seconds(1);
        (start, end)
    }

    /// Machine-friendly label, e.g. `2024-03`. Used in file names.
    #[must_use]
    pub fn label(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Human-readable name, e.g. `March 2024`.
    #[must_use]
    pub fn display_name(self) -> String {
        let name = u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map_or("?", |m| m.name());
        format!("{name} {}", self.year)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}
