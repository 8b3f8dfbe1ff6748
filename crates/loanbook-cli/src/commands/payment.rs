//! `payment add|list`.

use loanbook_core::{LoanId, Payment, format_date};

use super::{open_ledger, print_json, read_attachments, today};
use crate::cli::PaymentAction;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::service::ServiceError;

pub async fn run(action: PaymentAction, config: &ClientConfig) -> ClientResult<()> {
    match action {
        PaymentAction::Add {
            loan,
            borrower,
            amount,
            payment_type,
            method,
            date,
            received_by,
            notes,
            attachments,
        } => {
            let payment = Payment::new(
                date.unwrap_or_else(today),
                loan.map(LoanId::from),
                borrower.unwrap_or_default(),
                amount,
                payment_type,
                method,
            )
            .with_received_by(received_by)
            .with_notes(notes);
            payment.validate().map_err(ServiceError::from)?;
            let files = read_attachments(&attachments).await?;

            let service = open_ledger(config).await?;
            let derived = service.record_payment(payment, files).await?;

            let formatter = config.formatter();
            println!("Payment recorded.");
            println!(
                "Interest paid:  {}",
                formatter.amount(derived.total_interest_paid)
            );
            if let Some(month) = derived.paid_through_month {
                println!("Paid till:      {}", month);
            }
            if let Some(last) = derived.last_payment_date {
                println!("Last payment:   {}", format_date(last));
            }
            Ok(())
        }
        PaymentAction::List { loan, json } => {
            let service = open_ledger(config).await?;
            let loan_id = loan.map(LoanId::from);
            let payments = service.payments(loan_id.as_ref()).await?;
            if json {
                return print_json(&payments);
            }
            println!("{}", config.formatter().payment_table(&payments));
            Ok(())
        }
    }
}
