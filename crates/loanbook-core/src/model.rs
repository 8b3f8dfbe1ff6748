//! Loan and payment records.
//!
//! A [`Loan`] is one borrowing relationship; a [`Payment`] is one receipt of
//! money against a loan. Both are rows in append-only tables, so nothing here
//! carries a storage identity beyond the loan's [`LoanId`].

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::DerivedFields;
use crate::loan_id::LoanId;

/// Lifecycle state of a loan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Principal is still out with the borrower.
    #[default]
    Active,
    /// Loan settled.
    Closed,
    /// Borrower stopped paying.
    Defaulted,
}

impl LoanStatus {
    /// Returns the label stored in the sheet.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Closed => "Closed",
            Self::Defaulted => "Defaulted",
        }
    }

    /// Returns true for [`LoanStatus::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "defaulted" => Ok(Self::Defaulted),
            _ => Err(ParseEnumError::new("loan status", s)),
        }
    }
}

/// What a payment was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    Interest,
    Principal,
    Both,
}

impl PaymentType {
    /// Returns the label stored in the sheet.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interest => "Interest",
            Self::Principal => "Principal",
            Self::Both => "Both",
        }
    }

    /// Returns true if the payment counts towards interest received.
    pub fn counts_as_interest(&self) -> bool {
        matches!(self, Self::Interest | Self::Both)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "interest" => Ok(Self::Interest),
            "principal" => Ok(Self::Principal),
            "both" => Ok(Self::Both),
            _ => Err(ParseEnumError::new("payment type", s)),
        }
    }
}

/// How the money arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "UPI")]
    Upi,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cash,
    Cheque,
}

impl PaymentMethod {
    /// Returns the label stored in the sheet.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upi => "UPI",
            Self::BankTransfer => "Bank Transfer",
            Self::Cash => "Cash",
            Self::Cheque => "Cheque",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "upi" => Ok(Self::Upi),
            "banktransfer" | "bank" | "neft" | "imps" => Ok(Self::BankTransfer),
            "cash" => Ok(Self::Cash),
            "cheque" | "check" => Ok(Self::Cheque),
            _ => Err(ParseEnumError::new("payment method", s)),
        }
    }
}

/// Lowercases and strips separators so `Bank Transfer`, `bank-transfer` and
/// `BANK_TRANSFER` compare equal.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// An unrecognized enum label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// A person to reach about a loan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub phone: String,
}

impl Contact {
    pub fn new(
        name: impl Into<String>,
        relation: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relation: relation.into(),
            phone: phone.into(),
        }
    }

    /// Returns true if every field is blank.
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.relation.trim().is_empty() && self.phone.trim().is_empty()
    }
}

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("borrower name is required")]
    MissingBorrower,
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
    #[error("payment must reference a loan id or a borrower name")]
    MissingLoanReference,
    #[error("closure date {closed} is before the loan date {given}")]
    ClosureBeforeStart { given: NaiveDate, closed: NaiveDate },
}

/// User input for a loan that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub date_given: NaiveDate,
    pub borrower_name: String,
    pub principal_amount: Decimal,
    pub monthly_interest_rate_percent: Decimal,
    pub details: String,
    pub referrer: String,
    pub has_promissory_note: bool,
    pub status: LoanStatus,
    pub date_of_closure: Option<NaiveDate>,
    pub contacts: Vec<Contact>,
    pub attachment_links: Vec<String>,
}

impl NewLoan {
    /// Creates an active loan with no optional details.
    pub fn new(
        date_given: NaiveDate,
        borrower_name: impl Into<String>,
        principal_amount: Decimal,
        monthly_interest_rate_percent: Decimal,
    ) -> Self {
        Self {
            date_given,
            borrower_name: borrower_name.into(),
            principal_amount,
            monthly_interest_rate_percent,
            details: String::new(),
            referrer: String::new(),
            has_promissory_note: false,
            status: LoanStatus::Active,
            date_of_closure: None,
            contacts: Vec::new(),
            attachment_links: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn with_promissory_note(mut self, has_note: bool) -> Self {
        self.has_promissory_note = has_note;
        self
    }

    /// Adds a contact, ignoring entries with every field blank.
    pub fn with_contact(mut self, contact: Contact) -> Self {
        if !contact.is_blank() {
            self.contacts.push(contact);
        }
        self
    }

    pub fn with_attachment_links(mut self, links: Vec<String>) -> Self {
        self.attachment_links = links;
        self
    }

    /// Checks the fields a user types in.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.borrower_name.trim().is_empty() {
            return Err(ValidationError::MissingBorrower);
        }
        if self.principal_amount.is_sign_negative() && !self.principal_amount.is_zero() {
            return Err(ValidationError::Negative {
                field: "principal amount",
            });
        }
        if self.monthly_interest_rate_percent.is_sign_negative()
            && !self.monthly_interest_rate_percent.is_zero()
        {
            return Err(ValidationError::Negative {
                field: "monthly interest rate",
            });
        }
        Ok(())
    }

    /// Attaches an id, producing a stored loan with default derived fields.
    pub fn into_loan(self, loan_id: LoanId) -> Loan {
        Loan {
            loan_id,
            date_given: self.date_given,
            borrower_name: self.borrower_name.trim().to_string(),
            principal_amount: self.principal_amount,
            monthly_interest_rate_percent: self.monthly_interest_rate_percent,
            details: self.details,
            referrer: self.referrer,
            has_promissory_note: self.has_promissory_note,
            status: self.status,
            date_of_closure: self.date_of_closure,
            contacts: self.contacts,
            attachment_links: self.attachment_links,
            derived: DerivedFields::default(),
        }
    }
}

/// Normalized borrower name used whenever rows are matched by name.
///
/// Surrounding whitespace is dropped and case is folded with Unicode rules.
pub fn borrower_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A stored loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub date_given: NaiveDate,
    pub borrower_name: String,
    pub principal_amount: Decimal,
    pub monthly_interest_rate_percent: Decimal,
    pub details: String,
    pub referrer: String,
    pub has_promissory_note: bool,
    pub status: LoanStatus,
    pub date_of_closure: Option<NaiveDate>,
    pub contacts: Vec<Contact>,
    pub attachment_links: Vec<String>,
    /// Recomputed from payments; never edited by hand.
    pub derived: DerivedFields,
}

impl Loan {
    /// Simple interest due every month on the original principal.
    ///
    /// Zero when the product does not fit a `Decimal`, which leaves the loan
    /// with no computable months.
    pub fn monthly_interest_due(&self) -> Decimal {
        self.principal_amount
            .checked_mul(self.monthly_interest_rate_percent)
            .and_then(|interest| interest.checked_div(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO)
    }

    /// Moves the loan out of `Active`, stamping the closure date.
    pub fn close(&mut self, status: LoanStatus, on: NaiveDate) -> Result<(), ValidationError> {
        if on < self.date_given {
            return Err(ValidationError::ClosureBeforeStart {
                given: self.date_given,
                closed: on,
            });
        }
        self.status = status;
        self.date_of_closure = if status.is_active() { None } else { Some(on) };
        Ok(())
    }
}

/// One receipt of money against a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_date: NaiveDate,
    /// Empty for legacy rows that reference the loan by borrower name only.
    pub loan_id: Option<LoanId>,
    pub borrower_name: String,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub received_by: String,
    pub attachment_links: Vec<String>,
    pub notes: String,
}

impl Payment {
    /// Default value of `received_by`.
    pub const DEFAULT_RECEIVER: &'static str = "Self";

    pub fn new(
        payment_date: NaiveDate,
        loan_id: Option<LoanId>,
        borrower_name: impl Into<String>,
        amount: Decimal,
        payment_type: PaymentType,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            payment_date,
            loan_id,
            borrower_name: borrower_name.into(),
            amount,
            payment_type,
            payment_method,
            received_by: Self::DEFAULT_RECEIVER.to_string(),
            attachment_links: Vec::new(),
            notes: String::new(),
        }
    }

    /// Sets the receiver; blank input keeps the default.
    pub fn with_received_by(mut self, received_by: impl Into<String>) -> Self {
        let received_by = received_by.into();
        if !received_by.trim().is_empty() {
            self.received_by = received_by;
        }
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_attachment_links(mut self, links: Vec<String>) -> Self {
        self.attachment_links = links;
        self
    }

    /// Checks the fields a user types in.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(ValidationError::Negative { field: "amount" });
        }
        if self.loan_id.is_none() && self.borrower_name.trim().is_empty() {
            return Err(ValidationError::MissingLoanReference);
        }
        Ok(())
    }
}
