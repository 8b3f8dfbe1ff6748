//! Loan identifiers of the form `LOAN-YYYYMMDD-NNN`.
//!
//! The date stamp is the creation day and `NNN` is a 1-based, zero-padded
//! counter scoped to that day.
//!
//! # Limitation
//!
//! [`LoanIdGenerator::next`] counts the ids already carrying today's stamp and
//! adds one. Two loans created at the same moment from two sessions can be
//! given the same id. The tracker has a single user, so this is accepted.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LOAN_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^LOAN-(\d{4})(\d{2})(\d{2})-(\d{3,})$").expect("Invalid loan id regex")
});

/// Identifier of a stored loan.
///
/// Ids read back from a spreadsheet are kept verbatim even when they do not
/// follow the generated format; [`LoanId::parts`] returns `None` for those.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(String);

impl LoanId {
    /// Formats an id from its creation day and daily sequence number.
    pub fn from_parts(day: NaiveDate, sequence: u32) -> Self {
        Self(format!("LOAN-{}-{:03}", date_stamp(day), sequence))
    }

    /// Returns the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id has no text.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Splits a generated id into its creation day and sequence number.
    pub fn parts(&self) -> Option<(NaiveDate, u32)> {
        let caps = LOAN_ID_REGEX.captures(&self.0)?;
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        let sequence = caps[4].parse().ok()?;
        Some((NaiveDate::from_ymd_opt(year, month, day)?, sequence))
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LoanId {
    fn from(value: String) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<&str> for LoanId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl std::str::FromStr for LoanId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// `YYYYMMDD` for a calendar day.
fn date_stamp(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

/// Produces the next loan id for a day.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoanIdGenerator;

impl LoanIdGenerator {
    /// Returns the next id for `today` given every id already stored.
    ///
    /// The sequence is one more than the number of existing ids containing
    /// today's `YYYYMMDD` stamp anywhere in their text.
    pub fn next<'a, I>(today: NaiveDate, existing: I) -> LoanId
    where
        I: IntoIterator<Item = &'a LoanId>,
    {
        let stamp = date_stamp(today);
        let taken = existing
            .into_iter()
            .filter(|id| id.as_str().contains(&stamp))
            .count();
        LoanId::from_parts(today, taken as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_loan_of_the_day() {
        let id = LoanIdGenerator::next(day(2024, 3, 5), &Vec::<LoanId>::new());
        assert_eq!(id.as_str(), "LOAN-20240305-001");
    }

    #[test]
    fn three_loans_on_one_day() {
        let today = day(2024, 3, 5);
        let mut ids: Vec<LoanId> = vec![LoanId::from("LOAN-20240304-007")];
        for _ in 0..3 {
            let next = LoanIdGenerator::next(today, &ids);
            ids.push(next);
        }
        let suffixes: Vec<&str> = ids[1..].iter().map(|id| &id.as_str()[14..]).collect();
        assert_eq!(suffixes, vec!["001", "002", "003"]);
    }

    #[test]
    fn sequence_ignores_other_days_and_order() {
        let today = day(2024, 3, 5);
        let ids = vec![
            LoanId::from("LOAN-20240305-002"),
            LoanId::from("LOAN-20230101-001"),
            LoanId::from("LOAN-20240305-001"),
        ];
        assert_eq!(
            LoanIdGenerator::next(today, &ids).as_str(),
            "LOAN-20240305-003"
        );
    }

    #[test]
    fn parts_round_trip() {
        let id = LoanId::from_parts(day(2024, 12, 31), 12);
        assert_eq!(id.as_str(), "LOAN-20241231-012");
        assert_eq!(id.parts(), Some((day(2024, 12, 31), 12)));
    }

    #[test]
    fn foreign_ids_have_no_parts() {
        assert!(LoanId::from("Ravi").parts().is_none());
        assert!(LoanId::from("LOAN-20241341-001").parts().is_none());
        assert!(LoanId::from("  ").is_empty());
    }

    #[test]
    fn sequence_past_999_keeps_growing() {
        let id = LoanId::from_parts(day(2024, 1, 1), 1000);
        assert_eq!(id.as_str(), "LOAN-20240101-1000");
        assert_eq!(id.parts().map(|(_, seq)| seq), Some(1000));
    }
}
