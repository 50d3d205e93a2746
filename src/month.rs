//! Calendar-month keys.
//!
//! Every date shape that reaches the engine (a bare `YYYY-MM`, a calendar date,
//! a naive timestamp, or a timestamp with an offset) is truncated to its UTC
//! month by [`normalize_month_key`]. Nothing else in the crate derives month
//! keys, so grouping is consistent across plan lines, cost rows and revenue rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EacError, Result};

/// A calendar month, ordered chronologically and displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(EacError::validation(
                "month",
                format!("{month} is not a calendar month"),
            ));
        }
        if !(1..=9999).contains(&year) {
            return Err(EacError::validation(
                "year",
                format!("{year} is outside 0001-9999"),
            ));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Zero-based position of this month inside its year.
    pub fn index(&self) -> usize {
        (self.month - 1) as usize
    }

    /// The twelve months of `year`, January first.
    pub fn months_of(year: i32) -> Result<Vec<YearMonth>> {
        (1..=12).map(|m| YearMonth::new(year, m)).collect()
    }

    /// UTC conversion can carry a date outside 0001-9999, so this checks like `new`.
    fn from_date(date: impl Datelike) -> Result<Self> {
        Self::new(date.year(), date.month())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = EacError;

    fn from_str(s: &str) -> Result<Self> {
        normalize_month_key(s)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = EacError;

    fn try_from(value: String) -> Result<Self> {
        normalize_month_key(&value)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Truncate a date representation to its UTC calendar month.
///
/// Accepted shapes, tried in order:
/// - `YYYY-MM`
/// - `YYYY-MM-DD`
/// - RFC 3339 timestamps (`2025-03-31T22:00:00-05:00`), converted to UTC first
/// - SQL-style timestamps with an offset (`2025-03-01 00:00:00+00`)
/// - naive timestamps (`2025-03-01T08:30:00`, `2025-03-01 08:30`), taken as UTC
///
/// Reapplying the function to its own output is a no-op.
pub fn normalize_month_key(raw: &str) -> Result<YearMonth> {
    let value = raw.trim();
    let malformed = || EacError::validation("month", format!("'{raw}' is not a recognizable date"));

    if value.is_empty() {
        return Err(malformed());
    }

    if value.len() == 7 {
        let date = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
            .map_err(|_| malformed())?;
        return YearMonth::from_date(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return YearMonth::from_date(date);
    }

    if let Ok(stamp) = DateTime::parse_from_rfc3339(value) {
        return YearMonth::from_date(stamp.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(stamp) = DateTime::parse_from_str(value, format) {
            return YearMonth::from_date(stamp.with_timezone(&Utc));
        }
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(value, format) {
            return YearMonth::from_date(stamp);
        }
    }

    Err(malformed())
}
