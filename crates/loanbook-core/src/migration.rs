//! Spreadsheet layout versions and the upgrade plan between them.
//!
//! Version 1 is the layout written by the first tracker: no `Meta` sheet and
//! payments that may reference their loan by borrower name only. Version 2
//! adds `Meta` and expects every payment to carry a loan id where one can be
//! determined.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::loan_id::LoanId;
use crate::model::{Loan, Payment, borrower_key};
use crate::record::CellValue;
use crate::schema::SCHEMA_VERSION;

/// Key of the version row in the `Meta` sheet.
pub const VERSION_KEY: &str = "schema_version";

/// Layout version of a spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub const LEGACY: SchemaVersion = SchemaVersion(1);
    pub const CURRENT: SchemaVersion = SchemaVersion(SCHEMA_VERSION);

    /// Reads the version from `Meta` rows; `None` means the sheet is absent.
    ///
    /// A missing or unreadable version row counts as legacy.
    pub fn from_meta(rows: Option<&[Vec<String>]>) -> Self {
        let Some(rows) = rows else {
            return Self::LEGACY;
        };
        rows.iter()
            .find(|row| row.first().is_some_and(|key| key.trim() == VERSION_KEY))
            .and_then(|row| row.get(1))
            .and_then(|value| value.trim().parse().ok())
            .map(SchemaVersion)
            .unwrap_or(Self::LEGACY)
    }

    pub fn needs_migration(&self) -> bool {
        *self < Self::CURRENT
    }

    /// Written by a newer release; this one must not modify it.
    pub fn is_unsupported(&self) -> bool {
        *self > Self::CURRENT
    }

    /// `Meta` sheet contents recording this version, header row first.
    pub fn meta_rows(&self) -> Vec<Vec<CellValue>> {
        vec![
            vec![CellValue::text("Key"), CellValue::text("Value")],
            vec![CellValue::text(VERSION_KEY), CellValue::number(self.0)],
        ]
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A payment row that should be given a loan id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backfill {
    /// 1-based sheet row of the payment.
    pub row: usize,
    pub loan_id: LoanId,
}

/// Finds legacy payments whose borrower name matches exactly one loan.
///
/// `payments` pairs each payment with its sheet row. Payments that already
/// carry an id are left alone; names shared by several loans are skipped
/// because either loan could be meant.
pub fn plan_loan_id_backfill(loans: &[Loan], payments: &[(usize, Payment)]) -> Vec<Backfill> {
    let mut by_name: HashMap<String, Vec<&LoanId>> = HashMap::new();
    for loan in loans {
        by_name
            .entry(borrower_key(&loan.borrower_name))
            .or_default()
            .push(&loan.loan_id);
    }

    let mut plan = Vec::new();
    for (row, payment) in payments {
        if payment.loan_id.as_ref().is_some_and(|id| !id.is_empty()) {
            continue;
        }
        match by_name.get(&borrower_key(&payment.borrower_name)).map(Vec::as_slice) {
            Some([only]) => plan.push(Backfill {
                row: *row,
                loan_id: (*only).clone(),
            }),
            Some(candidates) => warn!(
                row,
                borrower = %payment.borrower_name,
                loans = candidates.len(),
                "borrower has several loans, leaving payment unlinked"
            ),
            None => debug!(
                row,
                borrower = %payment.borrower_name,
                "no loan for borrower, leaving payment unlinked"
            ),
        }
    }
    plan
}
