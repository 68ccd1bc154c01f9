//! Calendar month labels for bucketing.
//!
//! Counters bucket values under `"YYYY-MM"` labels plus an all-time bucket.
//! `Month` is the parsed form: ordered, hashable, with the arithmetic the
//! monthly series query needs (trailing windows, inclusive ranges).

use chrono::{DateTime, Datelike, Utc};
use std::fmt;

/// A calendar year-month, normalized to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    /// 1-based month number.
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month must be 1-12, got {}", month);
        Month { year, month }
    }

    /// The month containing the given instant.
    pub fn of(instant: &DateTime<Utc>) -> Self {
        Month::new(instant.year(), instant.month())
    }

    /// The current month.
    pub fn current() -> Self {
        Month::of(&Utc::now())
    }

    /// Parse a `"YYYY-MM"` label.
    pub fn parse(label: &str) -> Option<Self> {
        let (year, month) = label.split_once('-')?;
        let year: i32 = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Month { year, month })
    }

    /// The `"YYYY-MM"` label used in storage keys and series results.
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month `n` calendar months before this one.
    pub fn months_back(&self, n: u32) -> Self {
        let total = self.year * 12 + self.month as i32 - 1 - n as i32;
        Month {
            year: total.div_euclid(12),
            month: total.rem_euclid(12) as u32 + 1,
        }
    }

    /// Months from `self` through `end`, chronological and inclusive.
    /// Empty when `end` precedes `self`.
    pub fn through(&self, end: Month) -> Vec<Month> {
        let mut months = Vec::new();
        let mut cursor = *self;
        while cursor <= end {
            months.push(cursor);
            cursor = cursor.next();
        }
        months
    }

    fn next(&self) -> Self {
        if self.month == 12 {
            Month::new(self.year + 1, 1)
        } else {
            Month::new(self.year, self.month + 1)
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
