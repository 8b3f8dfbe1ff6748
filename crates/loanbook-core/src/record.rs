//! Row encoding for the `Loans` and `Interest Payments` sheets.
//!
//! Decoding is lenient about everything except the row's own date: a bad
//! amount reads as zero, bad contact JSON reads as no contacts, and unknown
//! enum labels fall back with a warning. Only an unreadable date makes the
//! whole row a [`RowError`].

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

use crate::attachments::{decode_links, encode_links};
use crate::ledger::DerivedFields;
use crate::loan_id::LoanId;
use crate::model::{Contact, Loan, LoanStatus, Payment, PaymentMethod, PaymentType};
use crate::month::YearMonth;
use crate::schema::{HeaderMap, loan_columns as lc, payment_columns as pc};

/// Date layouts accepted on read, most specific first.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d %b %Y"];

/// One value written to a cell.
///
/// Numbers serialize as JSON numbers so the sheet can sum them; everything
/// else is text stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Number(Decimal),
}

impl CellValue {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn number(value: impl Into<Decimal>) -> Self {
        Self::Number(value.into())
    }

    fn date(value: NaiveDate) -> Self {
        Self::Text(value.format("%Y-%m-%d").to_string())
    }

    fn optional_date(value: Option<NaiveDate>) -> Self {
        value.map(Self::date).unwrap_or_else(Self::empty)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Number(number) => match number.normalize().to_i64() {
                Some(whole) if number.fract().is_zero() => serializer.serialize_i64(whole),
                _ => serializer.serialize_f64(number.to_f64().unwrap_or_default()),
            },
        }
    }
}

/// A stored row that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{sheet} row {row}: {reason}")]
pub struct RowError {
    pub sheet: &'static str,
    /// 1-based sheet row number.
    pub row: usize,
    pub reason: String,
}

/// Maps [`Loan`] values to and from `Loans` rows.
pub struct LoanRecord;

impl LoanRecord {
    /// Cells for every loan column, keyed by header.
    pub fn encode(loan: &Loan) -> Vec<(&'static str, CellValue)> {
        let contacts = if loan.contacts.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&loan.contacts).unwrap_or_default()
        };
        let mut cells = vec![
            (lc::LOAN_ID, CellValue::text(loan.loan_id.as_str())),
            (lc::DATE_GIVEN, CellValue::date(loan.date_given)),
            (lc::NAME, CellValue::text(loan.borrower_name.clone())),
            (lc::AMOUNT, CellValue::number(loan.principal_amount)),
            (lc::RATE, CellValue::number(loan.monthly_interest_rate_percent)),
            (lc::DETAILS, CellValue::text(loan.details.clone())),
            (lc::VIA, CellValue::text(loan.referrer.clone())),
            (
                lc::PRO_NOTE,
                CellValue::text(if loan.has_promissory_note { "Yes" } else { "No" }),
            ),
            (lc::STATUS, CellValue::text(loan.status.as_str())),
            (lc::DATE_OF_CLOSURE, CellValue::optional_date(loan.date_of_closure)),
            (lc::CONTACTS, CellValue::text(contacts)),
            (lc::ATTACHMENTS, CellValue::text(encode_links(&loan.attachment_links))),
        ];
        cells.extend(Self::encode_derived(&loan.derived));
        cells
    }

    /// Cells for the three derived columns only.
    pub fn encode_derived(derived: &DerivedFields) -> Vec<(&'static str, CellValue)> {
        vec![
            (
                lc::LAST_PAYMENT_DATE,
                CellValue::optional_date(derived.last_payment_date),
            ),
            (
                lc::TOTAL_INTEREST_PAID,
                CellValue::number(derived.total_interest_paid),
            ),
            (
                lc::PAID_THROUGH_MONTH,
                derived
                    .paid_through_month
                    .map(|m| CellValue::text(m.to_string()))
                    .unwrap_or_else(CellValue::empty),
            ),
        ]
    }

    /// Decodes sheet row `row_number` (1-based).
    pub fn decode(map: &HeaderMap, row: &[String], row_number: usize) -> Result<Loan, RowError> {
        let sheet = map.schema().sheet;
        let cell = |column| map.cell(row, column);

        let loan_id = LoanId::from(cell(lc::LOAN_ID));
        if loan_id.is_empty() {
            return Err(row_error(sheet, row_number, "missing loan id"));
        }
        let date_given = parse_date(cell(lc::DATE_GIVEN)).ok_or_else(|| {
            row_error(
                sheet,
                row_number,
                format!("unreadable date given {:?}", cell(lc::DATE_GIVEN)),
            )
        })?;

        let status = parse_or_warn(cell(lc::STATUS), LoanStatus::Active, sheet, row_number);
        let last_payment_date = parse_date(cell(lc::LAST_PAYMENT_DATE));
        let paid_through_month = cell(lc::PAID_THROUGH_MONTH).parse::<YearMonth>().ok();

        Ok(Loan {
            loan_id,
            date_given,
            borrower_name: cell(lc::NAME).to_string(),
            principal_amount: parse_amount(cell(lc::AMOUNT)),
            monthly_interest_rate_percent: parse_amount(cell(lc::RATE)),
            details: cell(lc::DETAILS).to_string(),
            referrer: cell(lc::VIA).to_string(),
            has_promissory_note: parse_flag(cell(lc::PRO_NOTE)),
            status,
            date_of_closure: parse_date(cell(lc::DATE_OF_CLOSURE)),
            contacts: parse_contacts(cell(lc::CONTACTS), sheet, row_number),
            attachment_links: decode_links(cell(lc::ATTACHMENTS)),
            derived: DerivedFields {
                last_payment_date,
                total_interest_paid: parse_amount(cell(lc::TOTAL_INTEREST_PAID)),
                paid_through_month,
            },
        })
    }
}

/// Maps [`Payment`] values to and from `Interest Payments` rows.
pub struct PaymentRecord;

impl PaymentRecord {
    pub fn encode(payment: &Payment) -> Vec<(&'static str, CellValue)> {
        vec![
            (pc::PAYMENT_DATE, CellValue::date(payment.payment_date)),
            (
                pc::LOAN_ID,
                CellValue::text(
                    payment
                        .loan_id
                        .as_ref()
                        .map(LoanId::as_str)
                        .unwrap_or_default(),
                ),
            ),
            (pc::BORROWER_NAME, CellValue::text(payment.borrower_name.clone())),
            (pc::AMOUNT, CellValue::number(payment.amount)),
            (pc::PAYMENT_TYPE, CellValue::text(payment.payment_type.as_str())),
            (pc::PAYMENT_METHOD, CellValue::text(payment.payment_method.as_str())),
            (pc::RECEIVED_BY, CellValue::text(payment.received_by.clone())),
            (pc::ATTACHMENTS, CellValue::text(encode_links(&payment.attachment_links))),
            (pc::NOTES, CellValue::text(payment.notes.clone())),
        ]
    }

    /// Decodes sheet row `row_number` (1-based).
    ///
    /// An unknown payment type reads as `Principal`, so it never counts as
    /// interest.
    pub fn decode(
        map: &HeaderMap,
        row: &[String],
        row_number: usize,
    ) -> Result<Payment, RowError> {
        let sheet = map.schema().sheet;
        let cell = |column| map.cell(row, column);

        let payment_date = parse_date(cell(pc::PAYMENT_DATE)).ok_or_else(|| {
            row_error(
                sheet,
                row_number,
                format!("unreadable payment date {:?}", cell(pc::PAYMENT_DATE)),
            )
        })?;

        let loan_id = Some(LoanId::from(cell(pc::LOAN_ID))).filter(|id| !id.is_empty());
        let received_by = match cell(pc::RECEIVED_BY) {
            "" => Payment::DEFAULT_RECEIVER.to_string(),
            other => other.to_string(),
        };

        Ok(Payment {
            payment_date,
            loan_id,
            borrower_name: cell(pc::BORROWER_NAME).to_string(),
            amount: parse_amount(cell(pc::AMOUNT)),
            payment_type: parse_or_warn(
                cell(pc::PAYMENT_TYPE),
                PaymentType::Principal,
                sheet,
                row_number,
            ),
            payment_method: parse_or_warn(
                cell(pc::PAYMENT_METHOD),
                PaymentMethod::Cash,
                sheet,
                row_number,
            ),
            received_by,
            attachment_links: decode_links(cell(pc::ATTACHMENTS)),
            notes: cell(pc::NOTES).to_string(),
        })
    }
}

fn row_error(sheet: &'static str, row: usize, reason: impl Into<String>) -> RowError {
    RowError {
        sheet,
        row,
        reason: reason.into(),
    }
}

/// Reads a date in any of the layouts the sheet has held over time.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Reads an amount, ignoring grouping commas and currency symbols; zero when
/// unreadable.
pub fn parse_amount(text: &str) -> Decimal {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '₹' | ' ' | '%'))
        .collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .unwrap_or(Decimal::ZERO)
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1"
    )
}

fn parse_contacts(text: &str, sheet: &str, row: usize) -> Vec<Contact> {
    if text.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Contact>>(text) {
        Ok(contacts) => contacts,
        Err(e) => {
            warn!(sheet, row, error = %e, "ignoring unreadable contacts");
            Vec::new()
        }
    }
}

fn parse_or_warn<T>(text: &str, fallback: T, sheet: &str, row: usize) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    if text.is_empty() {
        return fallback;
    }
    text.parse().unwrap_or_else(|_| {
        warn!(sheet, row, value = text, fallback = %fallback, "unknown label, using fallback");
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewLoan;
    use crate::schema::TableSchema;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Renders cells the way the values API returns them.
    fn as_sheet_text(cells: Vec<CellValue>) -> Vec<String> {
        cells
            .into_iter()
            .map(|cell| match cell {
                CellValue::Text(text) => text,
                CellValue::Number(number) => number.normalize().to_string(),
            })
            .collect()
    }

    fn sample_loan() -> Loan {
        let mut loan = NewLoan::new(
            date(2024, 1, 15),
            "Ravi Kumar",
            Decimal::from(10_000),
            "1.5".parse().unwrap(),
        )
        .with_referrer("Suresh")
        .with_promissory_note(true)
        .with_contact(Contact::new("Meena", "Sister", "98450 00000"))
        .with_attachment_links(vec!["https://a.example/1".to_string()])
        .into_loan(LoanId::from("LOAN-20240115-001"));
        loan.derived = DerivedFields {
            last_payment_date: Some(date(2024, 3, 1)),
            total_interest_paid: Decimal::from(300),
            paid_through_month: YearMonth::new(2024, 3),
        };
        loan
    }

    #[test]
    fn loan_row_survives_a_reordered_sheet() {
        let mut header = TableSchema::LOANS.header_row();
        header.reverse();
        let map = HeaderMap::resolve(TableSchema::LOANS, &header).unwrap();

        let loan = sample_loan();
        let row = as_sheet_text(map.layout(None, LoanRecord::encode(&loan)));
        assert_eq!(row[14], "LOAN-20240115-001");

        let decoded = LoanRecord::decode(&map, &row, 2).unwrap();
        assert_eq!(decoded, loan);
    }

    #[test]
    fn loan_cells_use_sheet_labels() {
        let map = HeaderMap::default_for(TableSchema::LOANS);
        let row = as_sheet_text(map.layout(None, LoanRecord::encode(&sample_loan())));
        insta::assert_snapshot!(row.join(" | "), @r#"LOAN-20240115-001 | 2024-01-15 | Ravi Kumar | 10000 | 1.5 |  | Suresh | Yes | Active |  | [{"name":"Meena","relation":"Sister","phone":"98450 00000"}] | 2024-03-01 | 300 | Mar 2024 | ["https://a.example/1"]"#);
    }

    #[test]
    fn legacy_loan_row_is_tolerated() {
        let map = HeaderMap::default_for(TableSchema::LOANS);
        let row: Vec<String> = [
            "LOAN-20230105-001",
            "1/5/2023",
            "Anil",
            "₹1,00,000",
            "2",
            "",
            "",
            "No",
            "",
            "",
            "{not json",
            "",
            "",
            "",
            "https://a.example/1.jpg,https://a.example/2.jpg",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let loan = LoanRecord::decode(&map, &row, 3).unwrap();
        assert_eq!(loan.date_given, date(2023, 1, 5));
        assert_eq!(loan.principal_amount, Decimal::from(100_000));
        assert_eq!(loan.status, LoanStatus::Active);
        assert!(loan.contacts.is_empty());
        assert_eq!(loan.attachment_links.len(), 2);
        assert!(loan.derived.is_empty());
    }

    #[test]
    fn bad_date_is_a_row_error() {
        let map = HeaderMap::default_for(TableSchema::LOANS);
        let row = vec!["LOAN-1".to_string(), "someday".to_string()];
        let err = LoanRecord::decode(&map, &row, 7).unwrap_err();
        assert_eq!(err.row, 7);
        assert_eq!(err.to_string(), "Loans row 7: unreadable date given \"someday\"");
    }

    #[test]
    fn payment_decode_fallbacks() {
        let map = HeaderMap::default_for(TableSchema::PAYMENTS);
        let row: Vec<String> = ["2024-02-01", "", "Anil", "abc", "Penalty", "PayPal", "", "", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let payment = PaymentRecord::decode(&map, &row, 2).unwrap();
        assert!(payment.loan_id.is_none());
        assert_eq!(payment.amount, Decimal::ZERO);
        assert_eq!(payment.payment_type, PaymentType::Principal);
        assert_eq!(payment.payment_method, PaymentMethod::Cash);
        assert_eq!(payment.received_by, "Self");
    }

    #[test]
    fn payment_round_trip() {
        let map = HeaderMap::default_for(TableSchema::PAYMENTS);
        let payment = Payment::new(
            date(2024, 2, 1),
            Some(LoanId::from("LOAN-20240115-001")),
            "Ravi Kumar",
            "250.75".parse().unwrap(),
            PaymentType::Both,
            PaymentMethod::BankTransfer,
        )
        .with_received_by("Amma")
        .with_notes("February");
        let row = as_sheet_text(map.layout(None, PaymentRecord::encode(&payment)));
        assert_eq!(PaymentRecord::decode(&map, &row, 2).unwrap(), payment);
    }

    #[test]
    fn amounts_and_dates_parse_loosely() {
        assert_eq!(parse_amount("1,00,000.50"), "100000.50".parse().unwrap());
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("1e3"), Decimal::from(1000));
        assert_eq!(parse_date("2024-03-05"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("3/5/2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("05 Mar 2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn numbers_serialize_as_json_numbers() {
        let cells = vec![
            CellValue::number(450),
            CellValue::number("1.5".parse::<Decimal>().unwrap()),
            CellValue::text("Mar 2024"),
        ];
        assert_eq!(serde_json::to_string(&cells).unwrap(), r#"[450,1.5,"Mar 2024"]"#);
    }
}
