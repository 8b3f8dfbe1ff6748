//! Ledger aggregation: derived loan fields from payment history.
//!
//! [`derive_fields`] is a pure function of a loan and the payments recorded
//! against it. Callers recompute it in full whenever a payment is added
//! rather than patching the stored values, so the derived columns cannot
//! drift from the payment table.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{Loan, LoanStatus, Payment, borrower_key};
use crate::month::YearMonth;

/// Loan fields computed from payments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// Latest payment date, if any payment exists.
    pub last_payment_date: Option<NaiveDate>,
    /// Sum of `Interest` and `Both` payments.
    pub total_interest_paid: Decimal,
    /// Last month whose interest is fully covered.
    pub paid_through_month: Option<YearMonth>,
}

impl DerivedFields {
    /// Returns true if no payment has contributed.
    pub fn is_empty(&self) -> bool {
        self.last_payment_date.is_none()
            && self.total_interest_paid.is_zero()
            && self.paid_through_month.is_none()
    }
}

/// Computes the derived fields for `loan` from its payments.
///
/// `payments` must already be restricted to this loan (see [`payments_for`])
/// and may be in any order. With no payments the defaults are returned.
pub fn derive_fields<'a, I>(loan: &Loan, payments: I) -> DerivedFields
where
    I: IntoIterator<Item = &'a Payment>,
{
    let mut last_payment_date: Option<NaiveDate> = None;
    let mut total_interest_paid = Decimal::ZERO;
    let mut seen_any = false;

    for payment in payments {
        seen_any = true;
        last_payment_date = last_payment_date.max(Some(payment.payment_date));
        if payment.payment_type.counts_as_interest() {
            total_interest_paid = total_interest_paid.saturating_add(payment.amount);
        }
    }

    if !seen_any {
        return DerivedFields::default();
    }

    let months = months_paid(total_interest_paid, loan.monthly_interest_due());
    let paid_through_month = Some(YearMonth::of(loan.date_given).plus_months(months));

    DerivedFields {
        last_payment_date,
        total_interest_paid: total_interest_paid.normalize(),
        paid_through_month,
    }
}

/// Whole months of interest covered by `total`; zero when nothing is due.
///
/// Saturates at `u32::MAX` when the quotient is too large to represent.
fn months_paid(total: Decimal, monthly_due: Decimal) -> u32 {
    if monthly_due <= Decimal::ZERO || total <= Decimal::ZERO {
        return 0;
    }
    total
        .checked_div(monthly_due)
        .and_then(|months| months.floor().to_u32())
        .unwrap_or(u32::MAX)
}

/// Selects the payments recorded against `loan`.
///
/// Payments carrying a loan id match on the id. A legacy payment without one
/// matches on the borrower name (see [`borrower_key`]), and only when that
/// name belongs to no other loan in `loans`. A payment from a borrower with
/// several loans therefore counts towards none of them until it is linked.
///
/// `loans` is the whole loan table, `loan` included.
pub fn payments_for<'a>(
    loan: &'a Loan,
    loans: &[Loan],
    payments: &'a [Payment],
) -> impl Iterator<Item = &'a Payment> + 'a {
    let key = borrower_key(&loan.borrower_name);
    let sole_loan = !key.is_empty()
        && loans
            .iter()
            .filter(|other| borrower_key(&other.borrower_name) == key)
            .count()
            == 1;

    payments.iter().filter(move |payment| match &payment.loan_id {
        Some(id) if !id.is_empty() => *id == loan.loan_id,
        _ => sole_loan && borrower_key(&payment.borrower_name) == key,
    })
}

/// Totals across every loan, shown above the loan list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioSummary {
    pub active: usize,
    pub closed: usize,
    pub defaulted: usize,
    /// Principal of active loans.
    pub principal_outstanding: Decimal,
    /// Interest received across all loans.
    pub interest_received: Decimal,
    /// Interest due each month across active loans.
    pub monthly_interest_expected: Decimal,
}

impl PortfolioSummary {
    pub fn from_loans<'a, I>(loans: I) -> Self
    where
        I: IntoIterator<Item = &'a Loan>,
    {
        let mut summary = Self::default();
        for loan in loans {
            summary.interest_received = summary
                .interest_received
                .saturating_add(loan.derived.total_interest_paid);
            match loan.status {
                LoanStatus::Active => {
                    summary.active += 1;
                    summary.principal_outstanding = summary
                        .principal_outstanding
                        .saturating_add(loan.principal_amount);
                    summary.monthly_interest_expected = summary
                        .monthly_interest_expected
                        .saturating_add(loan.monthly_interest_due());
                }
                LoanStatus::Closed => summary.closed += 1,
                LoanStatus::Defaulted => summary.defaulted += 1,
            }
        }
        summary
    }
}
