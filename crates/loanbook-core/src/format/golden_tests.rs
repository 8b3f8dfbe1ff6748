//! Golden tests for terminal output.
//!
//! Inline insta snapshots; run `cargo insta review` after intentional layout
//! changes.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::format::LedgerFormatter;
use crate::ledger::{PortfolioSummary, derive_fields};
use crate::loan_id::LoanId;
use crate::model::{Contact, Loan, LoanStatus, NewLoan, Payment, PaymentMethod, PaymentType};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ravi_payments() -> Vec<Payment> {
    let id = Some(LoanId::from("LOAN-20240115-001"));
    vec![
        Payment::new(
            date(2024, 2, 15),
            id.clone(),
            "Ravi Kumar",
            Decimal::from(2000),
            PaymentType::Interest,
            PaymentMethod::Upi,
        ),
        Payment::new(
            date(2024, 3, 15),
            id,
            "Ravi Kumar",
            Decimal::from(2000),
            PaymentType::Both,
            PaymentMethod::BankTransfer,
        ),
    ]
}

/// 1,00,000 at 2% with two months of interest paid.
fn ravi_loan() -> Loan {
    let mut loan = NewLoan::new(
        date(2024, 1, 15),
        "Ravi Kumar",
        Decimal::from(100_000),
        Decimal::from(2),
    )
    .with_details("Shop renovation")
    .with_referrer("Suresh")
    .with_promissory_note(true)
    .with_contact(Contact::new("Meena", "Sister", "98450 00000"))
    .with_attachment_links(vec![
        "https://drive.google.com/uc?export=view&id=abc".to_string(),
    ])
    .into_loan(LoanId::from("LOAN-20240115-001"));
    loan.derived = derive_fields(&loan, &ravi_payments());
    loan
}

fn meena_loan() -> Loan {
    let mut loan = NewLoan::new(
        date(2023, 11, 1),
        "Meena",
        Decimal::from(25_000),
        "1.5".parse().unwrap(),
    )
    .into_loan(LoanId::from("LOAN-20231101-002"));
    loan.close(LoanStatus::Closed, date(2024, 2, 1)).unwrap();
    loan
}

#[test]
fn golden_loan_table() {
    let output = LedgerFormatter::default().loan_table(&[ravi_loan(), meena_loan()]);
    insta::assert_snapshot!(output, @r"
    ID                 BORROWER    PRINCIPAL  RATE  PAID TILL  STATUS
    LOAN-20240115-001  Ravi Kumar  ₹1,00,000  2%    Mar 2024   [active]
    LOAN-20231101-002  Meena       ₹25,000    1.5%  -          [closed]
    ");
}

#[test]
fn golden_empty_tables() {
    let formatter = LedgerFormatter::default();
    assert_eq!(formatter.loan_table(&[]), "No loans recorded.");
    assert_eq!(formatter.payment_table(&[]), "No payments recorded.");
}

#[test]
fn golden_payment_table_with_legacy_row() {
    let mut payments = vec![Payment::new(
        date(2023, 12, 1),
        None,
        "Meena",
        Decimal::from(500),
        PaymentType::Principal,
        PaymentMethod::Cash,
    )];
    payments.extend(ravi_payments());

    let output = LedgerFormatter::default().payment_table(&payments);
    insta::assert_snapshot!(output, @r"
    DATE         LOAN               BORROWER    AMOUNT  TYPE       METHOD
    01 Dec 2023  -                  Meena       ₹500    Principal  Cash
    15 Feb 2024  LOAN-20240115-001  Ravi Kumar  ₹2,000  Interest   UPI
    15 Mar 2024  LOAN-20240115-001  Ravi Kumar  ₹2,000  Both       Bank Transfer
    ");
}

#[test]
fn golden_loan_detail() {
    let output = LedgerFormatter::default().loan_detail(&ravi_loan(), &ravi_payments());
    insta::assert_snapshot!(output, @r"
    LOAN-20240115-001  [active]
    Borrower:        Ravi Kumar
    Date given:      15 Jan 2024
    Principal:       ₹1,00,000
    Interest:        2% a month (₹2,000)
    Via:             Suresh
    Promissory note: yes
    Details:         Shop renovation
    Contact:         Meena (Sister) 98450 00000
    Last payment:    15 Mar 2024
    Interest paid:   ₹4,000
    Paid till:       Mar 2024
    Attachment:      https://drive.google.com/uc?export=view&id=abc

    DATE         LOAN               BORROWER    AMOUNT  TYPE      METHOD
    15 Feb 2024  LOAN-20240115-001  Ravi Kumar  ₹2,000  Interest  UPI
    15 Mar 2024  LOAN-20240115-001  Ravi Kumar  ₹2,000  Both      Bank Transfer
    ");
}

#[test]
fn golden_summary() {
    let loans = [ravi_loan(), meena_loan()];
    let summary = PortfolioSummary::from_loans(&loans);
    insta::assert_snapshot!(
        LedgerFormatter::default().summary(&summary),
        @"1 active, 1 closed, 0 defaulted | outstanding ₹1,00,000 | interest received ₹4,000 | expected ₹2,000/month"
    );
}

#[test]
fn golden_custom_symbol() {
    let formatter = LedgerFormatter::new(crate::format::AmountFormat::with_symbol("Rs "));
    assert_eq!(formatter.amount(Decimal::from(1_500_000)), "Rs 15,00,000");
}
