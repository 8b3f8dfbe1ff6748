//! `loan add|list|show|close`.

use loanbook_core::{LoanId, LoanStatus, NewLoan, PortfolioSummary, format_date};
use serde_json::json;

use super::{open_ledger, print_json, read_attachments, today};
use crate::cli::LoanAction;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::service::ServiceError;

pub async fn run(action: LoanAction, config: &ClientConfig) -> ClientResult<()> {
    match action {
        LoanAction::Add {
            name,
            amount,
            rate,
            date,
            details,
            referrer,
            promissory_note,
            contacts,
            attachments,
        } => {
            let mut loan = NewLoan::new(date.unwrap_or_else(today), name, amount, rate)
                .with_details(details)
                .with_referrer(referrer)
                .with_promissory_note(promissory_note);
            for contact in contacts {
                loan = loan.with_contact(contact);
            }
            loan.validate().map_err(ServiceError::from)?;
            let files = read_attachments(&attachments).await?;

            let service = open_ledger(config).await?;
            let loan_id = service.add_loan(loan, files).await?;
            println!("Added loan {}.", loan_id);
            Ok(())
        }
        LoanAction::List { status, json } => {
            let service = open_ledger(config).await?;
            let loans = service.loans().await?;
            let summary = PortfolioSummary::from_loans(&loans);
            let shown: Vec<_> = match status {
                Some(status) => loans.into_iter().filter(|l| l.status == status).collect(),
                None => loans,
            };

            if json {
                return print_json(&json!({ "summary": summary, "loans": shown }));
            }
            let formatter = config.formatter();
            println!("{}", formatter.summary(&summary));
            println!();
            println!("{}", formatter.loan_table(&shown));
            Ok(())
        }
        LoanAction::Show { loan_id, json } => {
            let service = open_ledger(config).await?;
            let history = service.loan(&LoanId::from(loan_id)).await?;
            if json {
                return print_json(&history);
            }
            println!(
                "{}",
                config
                    .formatter()
                    .loan_detail(&history.loan, &history.payments)
            );
            Ok(())
        }
        LoanAction::Close {
            loan_id,
            defaulted,
            date,
        } => {
            let status = if defaulted {
                LoanStatus::Defaulted
            } else {
                LoanStatus::Closed
            };
            let service = open_ledger(config).await?;
            let loan = service
                .close_loan(&LoanId::from(loan_id), status, date.unwrap_or_else(today))
                .await?;
            let closed_on = loan.date_of_closure.map(format_date).unwrap_or_default();
            println!("{} is now {} as of {}.", loan.loan_id, loan.status, closed_on);
            Ok(())
        }
    }
}
