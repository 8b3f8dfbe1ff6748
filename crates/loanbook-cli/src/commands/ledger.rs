//! Whole-ledger commands: `recompute`, `migrate` and `open`.

use loanbook_core::{LoanId, format_date};

use super::{connect, open_ledger};
use crate::cli::OpenTarget;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Recomputes one loan, or every loan when no id is given.
pub async fn recompute(loan_id: Option<String>, config: &ClientConfig) -> ClientResult<()> {
    let service = open_ledger(config).await?;
    match loan_id {
        Some(id) => {
            let loan_id = LoanId::from(id);
            let derived = service.recompute(&loan_id).await?;
            let formatter = config.formatter();
            println!(
                "{}: interest paid {}, paid till {}, last payment {}",
                loan_id,
                formatter.amount(derived.total_interest_paid),
                derived
                    .paid_through_month
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                derived
                    .last_payment_date
                    .map(format_date)
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        None => {
            let updated = service.recompute_all().await?;
            println!("Recomputed all loans, {} updated.", updated);
        }
    }
    Ok(())
}

pub async fn migrate(config: &ClientConfig) -> ClientResult<()> {
    let service = connect(config)?;
    let report = service.migrate().await?;
    let migration = &report.migration;
    if migration.changed() {
        println!(
            "Upgraded spreadsheet from {} to {}: linked {} payments, updated {} loans.",
            migration.from, migration.to, migration.backfilled_payments, report.recomputed
        );
    } else {
        println!("Spreadsheet is already at {}.", migration.to);
    }
    Ok(())
}

/// Opens the spreadsheet or the attachment folder in the browser.
pub async fn open(target: OpenTarget, config: &ClientConfig) -> ClientResult<()> {
    let service = open_ledger(config).await?;
    let url = match target {
        OpenTarget::Sheet => service.ledger_url().await?,
        OpenTarget::Folder => service.attachments_url().await?,
    };
    println!("{}", url);
    open::that(&url).map_err(|e| ClientError::Action(format!("failed to open {}: {}", url, e)))
}
