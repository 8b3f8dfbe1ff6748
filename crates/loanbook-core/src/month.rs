//! Calendar month arithmetic for "paid through" labels.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar month, e.g. March 2024.
///
/// Day-of-month is dropped, so adding months never trips over short months.
/// Displays as `"Mar 2024"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct YearMonth {
    year: i32,
    /// 1-based.
    month: u32,
}

impl YearMonth {
    /// Creates a month; `month` is 1-based.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Advances by `months` calendar months, rolling over year boundaries.
    ///
    /// Saturates at the largest representable year.
    pub fn plus_months(self, months: u32) -> Self {
        let index = i64::from(self.year) * 12 + i64::from(self.month - 1) + i64::from(months);
        let year = (index.div_euclid(12)).min(i64::from(i32::MAX)) as i32;
        let month = index.rem_euclid(12) as u32 + 1;
        Self { year, month }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = MONTH_ABBREVIATIONS[(self.month - 1) as usize];
        write!(f, "{} {}", name, self.year)
    }
}

/// A month label that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month label: {0:?}")]
pub struct ParseMonthError(String);

impl FromStr for YearMonth {
    type Err = ParseMonthError;

    /// Parses `"Mar 2024"` (case-insensitive, full names accepted) or `"2024-03"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMonthError(s.to_string());
        let trimmed = s.trim();

        if let Some((year, month)) = trimmed.split_once('-') {
            let year = year.parse().map_err(|_| err())?;
            let month = month.parse().map_err(|_| err())?;
            return Self::new(year, month).ok_or_else(err);
        }

        let mut words = trimmed.split_whitespace();
        let (Some(name), Some(year), None) = (words.next(), words.next(), words.next()) else {
            return Err(err());
        };
        let prefix = name.get(..3).ok_or_else(err)?.to_ascii_lowercase();
        let month = MONTH_ABBREVIATIONS
            .iter()
            .position(|abbr| abbr.eq_ignore_ascii_case(&prefix))
            .ok_or_else(err)?;
        let year = year.parse().map_err(|_| err())?;
        Ok(Self {
            year,
            month: month as u32 + 1,
        })
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = ParseMonthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn label_format() {
        assert_eq!(ym(2024, 3).to_string(), "Mar 2024");
        assert_eq!(ym(1999, 12).to_string(), "Dec 1999");
    }

    #[test]
    fn adding_zero_keeps_the_month() {
        assert_eq!(ym(2024, 3).plus_months(0), ym(2024, 3));
    }

    #[test]
    fn rolls_over_year_boundaries() {
        assert_eq!(ym(2023, 11).plus_months(2), ym(2024, 1));
        assert_eq!(ym(2023, 11).plus_months(14), ym(2025, 1));
        assert_eq!(ym(2024, 12).plus_months(1), ym(2025, 1));
        assert_eq!(ym(2024, 1).plus_months(24), ym(2026, 1));
    }

    #[test]
    fn day_of_month_does_not_matter() {
        let jan_31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(YearMonth::of(jan_31).plus_months(1), ym(2024, 2));
    }

    #[test]
    fn huge_offsets_saturate() {
        let far = ym(2024, 1).plus_months(u32::MAX);
        assert!(far.year() > 2024);
        assert!((1..=12).contains(&far.month()));
    }

    #[test]
    fn parses_labels() {
        assert_eq!("Mar 2024".parse(), Ok(ym(2024, 3)));
        assert_eq!("september 2023".parse(), Ok(ym(2023, 9)));
        assert_eq!("2024-11".parse(), Ok(ym(2024, 11)));
        assert!("Smarch 2024".parse::<YearMonth>().is_err());
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("".parse::<YearMonth>().is_err());
    }

    #[test]
    fn rejects_invalid_month_numbers() {
        assert!(YearMonth::new(2024, 0).is_none());
        assert!(YearMonth::new(2024, 13).is_none());
    }
}
