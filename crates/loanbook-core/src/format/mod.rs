//! Terminal rendering of loans and payments.
//!
//! Amounts use Indian digit grouping (`1,00,000.50`): the last three integer
//! digits form one group and the rest are grouped in pairs. Fractions are
//! shown with two places only when non-zero.
//!
//! ```rust
//! use loanbook_core::format::{format_amount, AmountFormat};
//! use rust_decimal::Decimal;
//!
//! let text = format_amount(Decimal::new(10000050, 2), &AmountFormat::default());
//! assert_eq!(text, "₹1,00,000.50");
//! ```

use std::borrow::Cow;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::ledger::PortfolioSummary;
use crate::model::{Loan, LoanStatus, Payment};

const DEFAULT_CURRENCY_SYMBOL: &str = "₹";
const DEFAULT_NAME_WIDTH: usize = 24;

/// How amounts are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountFormat {
    /// Prefix placed before every amount; may be empty.
    pub currency_symbol: String,
}

impl Default for AmountFormat {
    fn default() -> Self {
        Self {
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }
}

impl AmountFormat {
    pub fn with_symbol(symbol: impl Into<String>) -> Self {
        Self {
            currency_symbol: symbol.into(),
        }
    }
}

/// Formats `amount` with Indian grouping and the configured symbol.
pub fn format_amount(amount: Decimal, format: &AmountFormat) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let abs = rounded.abs();
    let integer = abs.trunc();
    let fraction = abs - integer;

    let mut text = format!(
        "{}{}{}",
        sign,
        format.currency_symbol,
        group_indian(&integer.to_string())
    );
    if !fraction.is_zero() {
        // fraction < 1 with at most two places, so this is always 0..=99
        let cents = (fraction * Decimal::ONE_HUNDRED).trunc().to_u32().unwrap_or(0);
        text.push_str(&format!(".{:02}", cents));
    }
    text
}

/// Inserts Indian thousands separators into a string of ASCII digits.
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

/// `15 Jan 2024`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

fn format_optional_date(date: Option<NaiveDate>) -> String {
    date.map(format_date).unwrap_or_else(|| "-".to_string())
}

/// Short bracketed status tag for list views.
pub fn status_badge(status: LoanStatus) -> &'static str {
    match status {
        LoanStatus::Active => "[active]",
        LoanStatus::Closed => "[closed]",
        LoanStatus::Defaulted => "[DEFAULTED]",
    }
}

/// Truncates `s` to `max_len` characters, ending in `...` when cut.
pub fn ellipsis(s: &str, max_len: usize) -> Cow<'_, str> {
    if max_len == 0 {
        return Cow::Borrowed("");
    }
    if s.chars().count() <= max_len {
        return Cow::Borrowed(s);
    }
    let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
    Cow::Owned(format!("{}...", truncated))
}

/// Renders loans, payments and totals as plain text.
#[derive(Debug, Clone)]
pub struct LedgerFormatter {
    amounts: AmountFormat,
    name_width: usize,
}

impl Default for LedgerFormatter {
    fn default() -> Self {
        Self::new(AmountFormat::default())
    }
}

impl LedgerFormatter {
    pub fn new(amounts: AmountFormat) -> Self {
        Self {
            amounts,
            name_width: DEFAULT_NAME_WIDTH,
        }
    }

    pub fn amount(&self, amount: Decimal) -> String {
        format_amount(amount, &self.amounts)
    }

    /// One line per loan under a header row.
    pub fn loan_table(&self, loans: &[Loan]) -> String {
        if loans.is_empty() {
            return "No loans recorded.".to_string();
        }
        let rows: Vec<Vec<String>> = loans
            .iter()
            .map(|loan| {
                vec![
                    loan.loan_id.to_string(),
                    ellipsis(&loan.borrower_name, self.name_width).into_owned(),
                    self.amount(loan.principal_amount),
                    format!("{}%", loan.monthly_interest_rate_percent.normalize()),
                    loan.derived
                        .paid_through_month
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    status_badge(loan.status).to_string(),
                ]
            })
            .collect();
        render_table(
            &["ID", "BORROWER", "PRINCIPAL", "RATE", "PAID TILL", "STATUS"],
            &rows,
        )
    }

    /// One line per payment under a header row.
    pub fn payment_table(&self, payments: &[Payment]) -> String {
        if payments.is_empty() {
            return "No payments recorded.".to_string();
        }
        let rows: Vec<Vec<String>> = payments
            .iter()
            .map(|payment| {
                vec![
                    format_date(payment.payment_date),
                    payment
                        .loan_id
                        .as_ref()
                        .filter(|id| !id.is_empty())
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    ellipsis(&payment.borrower_name, self.name_width).into_owned(),
                    self.amount(payment.amount),
                    payment.payment_type.to_string(),
                    payment.payment_method.to_string(),
                ]
            })
            .collect();
        render_table(
            &["DATE", "LOAN", "BORROWER", "AMOUNT", "TYPE", "METHOD"],
            &rows,
        )
    }

    /// Full description of one loan followed by its payments.
    pub fn loan_detail(&self, loan: &Loan, payments: &[Payment]) -> String {
        let mut lines = vec![
            format!("{}  {}", loan.loan_id, status_badge(loan.status)),
            format!("Borrower:        {}", loan.borrower_name),
            format!("Date given:      {}", format_date(loan.date_given)),
            format!("Principal:       {}", self.amount(loan.principal_amount)),
            format!(
                "Interest:        {}% a month ({})",
                loan.monthly_interest_rate_percent.normalize(),
                self.amount(loan.monthly_interest_due())
            ),
        ];
        if !loan.referrer.is_empty() {
            lines.push(format!("Via:             {}", loan.referrer));
        }
        lines.push(format!(
            "Promissory note: {}",
            if loan.has_promissory_note { "yes" } else { "no" }
        ));
        if let Some(closed) = loan.date_of_closure {
            lines.push(format!("Closed on:       {}", format_date(closed)));
        }
        if !loan.details.is_empty() {
            lines.push(format!("Details:         {}", loan.details));
        }
        for contact in &loan.contacts {
            let relation = if contact.relation.is_empty() {
                String::new()
            } else {
                format!(" ({})", contact.relation)
            };
            lines.push(format!(
                "Contact:         {}{} {}",
                contact.name, relation, contact.phone
            ));
        }
        lines.push(format!(
            "Last payment:    {}",
            format_optional_date(loan.derived.last_payment_date)
        ));
        lines.push(format!(
            "Interest paid:   {}",
            self.amount(loan.derived.total_interest_paid)
        ));
        lines.push(format!(
            "Paid till:       {}",
            loan.derived
                .paid_through_month
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
        for link in &loan.attachment_links {
            lines.push(format!("Attachment:      {}", link));
        }
        lines.push(String::new());
        lines.push(self.payment_table(payments));
        lines.join("\n")
    }

    /// Portfolio totals shown above the loan list.
    pub fn summary(&self, summary: &PortfolioSummary) -> String {
        format!(
            "{} active, {} closed, {} defaulted | outstanding {} | interest received {} | expected {}/month",
            summary.active,
            summary.closed,
            summary.defaulted,
            self.amount(summary.principal_outstanding),
            self.amount(summary.interest_received),
            self.amount(summary.monthly_interest_expected),
        )
    }
}

/// Left-aligned columns separated by two spaces, trailing padding trimmed.
fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!("{}{}", cell, " ".repeat(pad))
            })
            .collect();
        line.join("  ").trim_end().to_string()
    };

    let mut out = vec![render_row(header.to_vec())];
    for row in rows {
        out.push(render_row(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

#[cfg(test)]
mod golden_tests;

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    #[test]
    fn indian_grouping() {
        let plain = AmountFormat::with_symbol("");
        assert_eq!(format_amount(amount("0"), &plain), "0");
        assert_eq!(format_amount(amount("999"), &plain), "999");
        assert_eq!(format_amount(amount("1000"), &plain), "1,000");
        assert_eq!(format_amount(amount("100000"), &plain), "1,00,000");
        assert_eq!(format_amount(amount("12345678"), &plain), "1,23,45,678");
    }

    #[test]
    fn fractions_only_when_present() {
        let rupees = AmountFormat::default();
        assert_eq!(format_amount(amount("100000.5"), &rupees), "₹1,00,000.50");
        assert_eq!(format_amount(amount("200.00"), &rupees), "₹200");
        assert_eq!(format_amount(amount("0.005"), &rupees), "₹0.01");
        assert_eq!(format_amount(amount("1.999"), &rupees), "₹2");
    }

    #[test]
    fn negative_amounts_lead_with_sign() {
        let rupees = AmountFormat::default();
        assert_eq!(format_amount(amount("-1500"), &rupees), "-₹1,500");
    }

    #[test]
    fn dates() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(format_date(date), "05 Jan 2024");
    }

    #[test]
    fn ellipsis_counts_characters() {
        assert_eq!(ellipsis("Ravi", 10), "Ravi");
        assert_eq!(ellipsis("Ravi Kumar Sharma", 10), "Ravi Ku...");
        assert_eq!(ellipsis("anything", 0), "");
    }
}
