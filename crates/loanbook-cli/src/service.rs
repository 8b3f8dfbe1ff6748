//! Ledger orchestration over the store traits.
//!
//! [`LedgerService`] is what the commands talk to. It validates input, uploads
//! attachments before any row is written, appends the row, then recomputes the
//! derived fields of the loan the row belongs to.

use std::sync::Arc;

use chrono::NaiveDate;
use loanbook_core::{
    DerivedFields, Loan, LoanId, LoanStatus, NewLoan, Payment, Principal, SchemaVersion,
    ValidationError, borrower_key, derive_fields, payments_for,
};
use loanbook_store::{
    AttachmentFile, AttachmentStore, Identity, LedgerStore, SchemaMigration, StoreError,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An upload failed, so the submission was dropped before any row was
    /// written.
    #[error("attachment upload failed, nothing was saved: {0}")]
    Attachment(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no loan with id {0}")]
    LoanNotFound(LoanId),

    #[error("no loan for borrower {0:?}")]
    UnknownBorrower(String),

    #[error("{name:?} has several loans ({}), pass the loan id", .candidates.join(", "))]
    AmbiguousBorrower { name: String, candidates: Vec<String> },

    #[error("loan {0} is already {1}")]
    AlreadyClosed(LoanId, LoanStatus),

    #[error("spreadsheet layout {0} is newer than this version of loanbook supports")]
    UnsupportedSchema(SchemaVersion),
}

impl ServiceError {
    /// Returns true if the user has to sign in again.
    pub fn is_authentication(&self) -> bool {
        match self {
            Self::NotSignedIn => true,
            Self::Store(e) | Self::Attachment(e) => e.is_authentication(),
            _ => false,
        }
    }
}

/// What [`LedgerService::migrate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migration: SchemaMigration,
    /// Loans whose derived fields were rewritten afterwards.
    pub recomputed: usize,
}

/// A loan with every payment recorded against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanHistory {
    pub loan: Loan,
    pub payments: Vec<Payment>,
}

pub struct LedgerService {
    ledger: Arc<dyn LedgerStore>,
    attachments: Arc<dyn AttachmentStore>,
    identity: Arc<dyn Identity>,
}

impl LedgerService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        attachments: Arc<dyn AttachmentStore>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            ledger,
            attachments,
            identity,
        }
    }

    pub fn principal(&self) -> Option<Principal> {
        self.identity.principal()
    }

    /// Checks the session and brings a legacy spreadsheet up to date.
    ///
    /// Returns the migration report when the tables were changed.
    pub async fn open(&self) -> ServiceResult<Option<MigrationReport>> {
        if !self.identity.is_authenticated() {
            return Err(ServiceError::NotSignedIn);
        }
        let version = self.guard(self.ledger.schema_version().await).await?;
        if version.is_unsupported() {
            return Err(ServiceError::UnsupportedSchema(version));
        }
        if !version.needs_migration() {
            debug!(%version, "spreadsheet layout is current");
            return Ok(None);
        }
        let report = self.migrate().await?;
        Ok(Some(report))
    }

    /// Upgrades the table layout, then recomputes every loan so payments
    /// linked by the backfill are counted.
    pub async fn migrate(&self) -> ServiceResult<MigrationReport> {
        let migration = self.guard(self.ledger.migrate_schema().await).await?;
        let recomputed = if migration.changed() {
            self.recompute_all().await?
        } else {
            0
        };
        info!(
            from = %migration.from,
            to = %migration.to,
            backfilled = migration.backfilled_payments,
            recomputed,
            "migration finished"
        );
        Ok(MigrationReport {
            migration,
            recomputed,
        })
    }

    /// Uploads the attachments, then appends the loan.
    pub async fn add_loan(
        &self,
        loan: NewLoan,
        files: Vec<AttachmentFile>,
    ) -> ServiceResult<LoanId> {
        loan.validate()?;
        let prefix = format!("loan_{}", loan.borrower_name.trim());
        let links = self.upload(files, &prefix).await?;

        let loan = if links.is_empty() {
            loan
        } else {
            let mut all = loan.attachment_links.clone();
            all.extend(links);
            loan.with_attachment_links(all)
        };
        let loan_id = self.guard(self.ledger.append_loan(loan).await).await?;
        info!(%loan_id, "loan added");
        Ok(loan_id)
    }

    /// Uploads the attachments, appends the payment and recomputes its loan.
    ///
    /// A payment given only a borrower name is linked to that borrower's
    /// loan when exactly one loan matches.
    pub async fn record_payment(
        &self,
        payment: Payment,
        files: Vec<AttachmentFile>,
    ) -> ServiceResult<DerivedFields> {
        payment.validate()?;
        let loans = self.guard(self.ledger.list_loans().await).await?;
        let loan = resolve_loan(&loans, &payment)?.clone();

        let mut payment = payment;
        payment.loan_id = Some(loan.loan_id.clone());
        if payment.borrower_name.trim().is_empty() {
            payment.borrower_name = loan.borrower_name.clone();
        }

        let prefix = format!("payment_{}", payment.borrower_name.trim());
        let links = self.upload(files, &prefix).await?;
        if !links.is_empty() {
            payment.attachment_links.extend(links);
        }

        self.guard(self.ledger.append_payment(payment).await).await?;
        info!(loan_id = %loan.loan_id, "payment recorded");
        self.recompute_loan(&loans, &loan).await
    }

    /// Recomputes and writes the derived fields of one loan.
    pub async fn recompute(&self, loan_id: &LoanId) -> ServiceResult<DerivedFields> {
        let loans = self.guard(self.ledger.list_loans().await).await?;
        let loan = find(&loans, loan_id)?;
        self.recompute_loan(&loans, loan).await
    }

    /// Recomputes every loan, writing only those whose stored values differ.
    ///
    /// Returns the number of loans rewritten.
    pub async fn recompute_all(&self) -> ServiceResult<usize> {
        let loans = self.guard(self.ledger.list_loans().await).await?;
        let payments = self.guard(self.ledger.list_payments().await).await?;

        let mut written = 0;
        for loan in &loans {
            let derived = derive_fields(loan, payments_for(loan, &loans, &payments));
            if derived == loan.derived {
                continue;
            }
            self.guard(
                self.ledger
                    .write_derived_fields(&loan.loan_id, &derived)
                    .await,
            )
            .await?;
            written += 1;
        }
        debug!(loans = loans.len(), written, "recomputed all loans");
        Ok(written)
    }

    async fn recompute_loan(&self, loans: &[Loan], loan: &Loan) -> ServiceResult<DerivedFields> {
        let payments = self.guard(self.ledger.list_payments().await).await?;
        let derived = derive_fields(loan, payments_for(loan, loans, &payments));
        self.guard(
            self.ledger
                .write_derived_fields(&loan.loan_id, &derived)
                .await,
        )
        .await?;
        debug!(loan_id = %loan.loan_id, ?derived, "derived fields written");
        Ok(derived)
    }

    /// Moves an active loan to `Closed` or `Defaulted`.
    pub async fn close_loan(
        &self,
        loan_id: &LoanId,
        status: LoanStatus,
        on: NaiveDate,
    ) -> ServiceResult<Loan> {
        let loans = self.guard(self.ledger.list_loans().await).await?;
        let mut loan = find(&loans, loan_id)?.clone();
        if !loan.status.is_active() {
            return Err(ServiceError::AlreadyClosed(loan.loan_id, loan.status));
        }
        loan.close(status, on)?;
        self.guard(self.ledger.update_loan(&loan).await).await?;
        info!(%loan_id, status = %loan.status, "loan closed");
        Ok(loan)
    }

    /// Loans in sheet order.
    pub async fn loans(&self) -> ServiceResult<Vec<Loan>> {
        self.guard(self.ledger.list_loans().await).await
    }

    /// One loan with its payments.
    pub async fn loan(&self, loan_id: &LoanId) -> ServiceResult<LoanHistory> {
        let loans = self.guard(self.ledger.list_loans().await).await?;
        let loan = find(&loans, loan_id)?.clone();
        let payments = self.guard(self.ledger.list_payments().await).await?;
        let payments = payments_for(&loan, &loans, &payments).cloned().collect();
        Ok(LoanHistory { loan, payments })
    }

    /// Payments in sheet order, optionally only those of one loan.
    pub async fn payments(&self, loan_id: Option<&LoanId>) -> ServiceResult<Vec<Payment>> {
        match loan_id {
            Some(id) => Ok(self.loan(id).await?.payments),
            None => self.guard(self.ledger.list_payments().await).await,
        }
    }

    pub async fn ledger_url(&self) -> ServiceResult<String> {
        self.guard(self.ledger.web_url().await).await
    }

    pub async fn attachments_url(&self) -> ServiceResult<String> {
        self.guard(self.attachments.web_url().await).await
    }

    async fn upload(&self, files: Vec<AttachmentFile>, prefix: &str) -> ServiceResult<Vec<String>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        match self.attachments.upload_files(files, prefix).await {
            Ok(links) => Ok(links),
            Err(e) if e.is_authentication() => Err(self.signed_out(e).await),
            Err(e) => Err(ServiceError::Attachment(e)),
        }
    }

    /// Passes a store result through, signing out on an authentication
    /// failure.
    async fn guard<T>(&self, result: Result<T, StoreError>) -> ServiceResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_authentication() => Err(self.signed_out(e).await),
            Err(e) => Err(ServiceError::Store(e)),
        }
    }

    async fn signed_out(&self, err: StoreError) -> ServiceError {
        warn!(error = %err, "session is no longer valid");
        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "failed to clear session");
        }
        ServiceError::Store(err)
    }
}

fn find<'a>(loans: &'a [Loan], loan_id: &LoanId) -> ServiceResult<&'a Loan> {
    loans
        .iter()
        .find(|loan| loan.loan_id == *loan_id)
        .ok_or_else(|| ServiceError::LoanNotFound(loan_id.clone()))
}

/// The loan a payment belongs to: by id, else the single loan of its
/// borrower.
fn resolve_loan<'a>(loans: &'a [Loan], payment: &Payment) -> ServiceResult<&'a Loan> {
    if let Some(id) = payment.loan_id.as_ref().filter(|id| !id.is_empty()) {
        return find(loans, id);
    }

    let name = payment.borrower_name.trim();
    let key = borrower_key(name);
    let matching: Vec<&Loan> = loans
        .iter()
        .filter(|loan| borrower_key(&loan.borrower_name) == key)
        .collect();
    match matching.as_slice() {
        [] => Err(ServiceError::UnknownBorrower(name.to_string())),
        [loan] => Ok(loan),
        many => Err(ServiceError::AmbiguousBorrower {
            name: name.to_string(),
            candidates: many.iter().map(|l| l.loan_id.to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanbook_core::{PaymentMethod, PaymentType};
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan(id: &str, name: &str) -> Loan {
        NewLoan::new(date(2024, 1, 10), name, Decimal::from(1000), Decimal::ONE)
            .into_loan(LoanId::from(id))
    }

    fn payment(loan_id: Option<&str>, name: &str) -> Payment {
        Payment::new(
            date(2024, 2, 10),
            loan_id.map(LoanId::from),
            name,
            Decimal::from(10),
            PaymentType::Interest,
            PaymentMethod::Upi,
        )
    }

    #[test]
    fn resolves_by_id_before_name() {
        let loans = vec![loan("LOAN-20240110-001", "Anil"), loan("LOAN-20240110-002", "Ravi")];
        let found = resolve_loan(&loans, &payment(Some("LOAN-20240110-002"), "Anil")).unwrap();
        assert_eq!(found.borrower_name, "Ravi");
    }

    #[test]
    fn resolves_unique_borrower_ignoring_case() {
        let loans = vec![loan("LOAN-20240110-001", "Anil"), loan("LOAN-20240110-002", "Ravi")];
        let found = resolve_loan(&loans, &payment(None, " ravi ")).unwrap();
        assert_eq!(found.loan_id.as_str(), "LOAN-20240110-002");
    }

    #[test]
    fn resolves_borrower_with_unicode_case() {
        let loans = vec![loan("LOAN-20240110-001", "Élise")];
        let found = resolve_loan(&loans, &payment(None, "élise")).unwrap();
        assert_eq!(found.loan_id.as_str(), "LOAN-20240110-001");
    }

    #[test]
    fn ambiguous_borrower_lists_candidates() {
        let loans = vec![loan("LOAN-20240110-001", "Anil"), loan("LOAN-20240111-001", "Anil")];
        let err = resolve_loan(&loans, &payment(None, "Anil")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"Anil\" has several loans (LOAN-20240110-001, LOAN-20240111-001), pass the loan id"
        );
    }

    #[test]
    fn unknown_references_fail() {
        let loans = vec![loan("LOAN-20240110-001", "Anil")];
        assert!(matches!(
            resolve_loan(&loans, &payment(None, "Sunita")),
            Err(ServiceError::UnknownBorrower(_))
        ));
        assert!(matches!(
            resolve_loan(&loans, &payment(Some("LOAN-20990101-001"), "Anil")),
            Err(ServiceError::LoanNotFound(_))
        ));
    }

    #[test]
    fn authentication_errors_are_detected() {
        assert!(ServiceError::NotSignedIn.is_authentication());
        assert!(ServiceError::Store(StoreError::authentication("expired")).is_authentication());
        assert!(!ServiceError::Store(StoreError::server("boom")).is_authentication());
        assert!(!ServiceError::UnknownBorrower("x".into()).is_authentication());
    }
}
