//! In-process backend holding everything in memory.
//!
//! Implements all three store traits over one shared state, so a test can
//! observe what a command wrote, make chosen uploads fail or expire the
//! session mid-run.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDate};
use loanbook_core::{
    DerivedFields, Loan, LoanId, LoanIdGenerator, NewLoan, Payment, Principal, SchemaVersion,
    plan_loan_id_backfill, upload_name,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{
    AttachmentFile, AttachmentStore, BoxFuture, Identity, LedgerStore, SchemaMigration,
};

const BACKEND: &str = "memory";

#[derive(Debug)]
struct MemoryState {
    loans: Vec<Loan>,
    payments: Vec<Payment>,
    version: SchemaVersion,
    uploads: Vec<AttachmentFile>,
    failing_uploads: Vec<String>,
    principal: Option<Principal>,
    row_writes: usize,
}

/// Store backed by plain vectors.
#[derive(Debug)]
pub struct MemoryStore {
    today: NaiveDate,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty current-layout store, signed in as a test user.
    pub fn new() -> Self {
        Self {
            today: Local::now().date_naive(),
            state: Mutex::new(MemoryState {
                loans: Vec::new(),
                payments: Vec::new(),
                version: SchemaVersion::CURRENT,
                uploads: Vec::new(),
                failing_uploads: Vec::new(),
                principal: Some(Principal {
                    name: "Test User".to_string(),
                    email: "test@example.com".to_string(),
                    picture_url: None,
                }),
                row_writes: 0,
            }),
        }
    }

    /// Fixes the day used for new loan ids.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Seeds the tables as a legacy layout would hold them.
    pub fn with_legacy_rows(self, loans: Vec<Loan>, payments: Vec<Payment>) -> Self {
        {
            let mut state = self.state();
            state.loans = loans;
            state.payments = payments;
            state.version = SchemaVersion::LEGACY;
        }
        self
    }

    /// Seeds the tables in the current layout.
    pub fn with_rows(self, loans: Vec<Loan>, payments: Vec<Payment>) -> Self {
        {
            let mut state = self.state();
            state.loans = loans;
            state.payments = payments;
        }
        self
    }

    /// Makes any upload of a file originally named `file_name` fail.
    pub fn fail_uploads_of(&self, file_name: impl Into<String>) {
        self.state().failing_uploads.push(file_name.into());
    }

    /// Drops the signed-in user, as a 401 from a remote would.
    pub fn expire_session(&self) {
        self.state().principal = None;
    }

    pub fn loans(&self) -> Vec<Loan> {
        self.state().loans.clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state().payments.clone()
    }

    /// Names of every file stored so far.
    pub fn uploaded_names(&self) -> Vec<String> {
        self.state()
            .uploads
            .iter()
            .map(|file| file.file_name.clone())
            .collect()
    }

    /// Count of appended or rewritten rows.
    pub fn row_writes(&self) -> usize {
        self.state().row_writes
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state, failing if nobody is signed in.
    fn signed_in(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        let state = self.state();
        if state.principal.is_none() {
            return Err(StoreError::authentication("not signed in").with_backend(BACKEND));
        }
        Ok(state)
    }

    fn ready<T: Send + 'static>(result: StoreResult<T>) -> BoxFuture<'static, StoreResult<T>> {
        Box::pin(async move { result })
    }

    fn not_found(loan_id: &LoanId) -> StoreError {
        StoreError::not_found(format!("no loan with id {}", loan_id)).with_backend(BACKEND)
    }
}

impl LedgerStore for MemoryStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn list_loans(&self) -> BoxFuture<'_, StoreResult<Vec<Loan>>> {
        Self::ready(self.signed_in().map(|state| state.loans.clone()))
    }

    fn list_payments(&self) -> BoxFuture<'_, StoreResult<Vec<Payment>>> {
        Self::ready(self.signed_in().map(|state| state.payments.clone()))
    }

    fn append_loan(&self, loan: NewLoan) -> BoxFuture<'_, StoreResult<LoanId>> {
        let result = self.signed_in().map(|mut state| {
            let loan_id =
                LoanIdGenerator::next(self.today, state.loans.iter().map(|l| &l.loan_id));
            debug!(%loan_id, "appending loan");
            state.loans.push(loan.into_loan(loan_id.clone()));
            state.row_writes += 1;
            loan_id
        });
        Self::ready(result)
    }

    fn append_payment(&self, payment: Payment) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.signed_in().map(|mut state| {
            state.payments.push(payment);
            state.row_writes += 1;
        });
        Self::ready(result)
    }

    fn write_derived_fields<'a>(
        &'a self,
        loan_id: &'a LoanId,
        derived: &'a DerivedFields,
    ) -> BoxFuture<'a, StoreResult<()>> {
        let result = self.signed_in().and_then(|mut state| {
            let loan = state
                .loans
                .iter_mut()
                .find(|loan| &loan.loan_id == loan_id)
                .ok_or_else(|| Self::not_found(loan_id))?;
            loan.derived = derived.clone();
            state.row_writes += 1;
            Ok(())
        });
        Self::ready(result)
    }

    fn update_loan<'a>(&'a self, loan: &'a Loan) -> BoxFuture<'a, StoreResult<()>> {
        let result = self.signed_in().and_then(|mut state| {
            let stored = state
                .loans
                .iter_mut()
                .find(|stored| stored.loan_id == loan.loan_id)
                .ok_or_else(|| Self::not_found(&loan.loan_id))?;
            *stored = loan.clone();
            state.row_writes += 1;
            Ok(())
        });
        Self::ready(result)
    }

    fn schema_version(&self) -> BoxFuture<'_, StoreResult<SchemaVersion>> {
        Self::ready(self.signed_in().map(|state| state.version))
    }

    fn migrate_schema(&self) -> BoxFuture<'_, StoreResult<SchemaMigration>> {
        let result = self.signed_in().map(|mut state| {
            if !state.version.needs_migration() {
                return SchemaMigration::up_to_date(state.version);
            }
            // rows numbered as in a sheet: header is row 1
            let numbered: Vec<(usize, Payment)> = state
                .payments
                .iter()
                .cloned()
                .enumerate()
                .map(|(index, payment)| (index + 2, payment))
                .collect();
            let plan = plan_loan_id_backfill(&state.loans, &numbered);
            for backfill in &plan {
                state.payments[backfill.row - 2].loan_id = Some(backfill.loan_id.clone());
            }
            let from = state.version;
            state.version = SchemaVersion::CURRENT;
            SchemaMigration {
                from,
                to: SchemaVersion::CURRENT,
                backfilled_payments: plan.len(),
            }
        });
        Self::ready(result)
    }

    fn web_url(&self) -> BoxFuture<'_, StoreResult<String>> {
        Self::ready(Ok("memory://ledger".to_string()))
    }
}

impl AttachmentStore for MemoryStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn upload_files<'a>(
        &'a self,
        files: Vec<AttachmentFile>,
        name_prefix: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<String>>> {
        let result = self.signed_in().and_then(|mut state| {
            let named: Vec<AttachmentFile> = files
                .into_iter()
                .enumerate()
                .map(|(index, file)| AttachmentFile {
                    file_name: upload_name(name_prefix, index, &file.file_name),
                    ..file
                })
                .collect();

            if let Some(bad) = named.iter().find(|file| {
                state
                    .failing_uploads
                    .iter()
                    .any(|failing| file.file_name.ends_with(failing.as_str()))
            }) {
                return Err(StoreError::attachment(format!(
                    "failed to upload {}",
                    bad.file_name
                ))
                .with_backend(BACKEND));
            }

            let links = named
                .iter()
                .map(|file| format!("memory://attachments/{}", file.file_name))
                .collect();
            state.uploads.extend(named);
            Ok(links)
        });
        Self::ready(result)
    }

    fn web_url(&self) -> BoxFuture<'_, StoreResult<String>> {
        Self::ready(Ok("memory://attachments".to_string()))
    }
}

impl Identity for MemoryStore {
    fn is_authenticated(&self) -> bool {
        self.state().principal.is_some()
    }

    fn principal(&self) -> Option<Principal> {
        self.state().principal.clone()
    }

    fn access_token(&self) -> BoxFuture<'_, StoreResult<String>> {
        Self::ready(self.signed_in().map(|_| "memory-token".to_string()))
    }

    fn sign_out(&self) -> BoxFuture<'_, StoreResult<()>> {
        self.state().principal = None;
        Self::ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use loanbook_core::{PaymentMethod, PaymentType};
    use rust_decimal::Decimal;

    use super::*;
    use crate::error::StoreErrorCode;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_loan(name: &str) -> NewLoan {
        NewLoan::new(date(2024, 3, 5), name, Decimal::from(1000), Decimal::ONE)
    }

    #[tokio::test]
    async fn append_assigns_daily_sequence() {
        let store = MemoryStore::new().with_today(date(2024, 3, 5));
        let first = store.append_loan(new_loan("Anil")).await.unwrap();
        let second = store.append_loan(new_loan("Ravi")).await.unwrap();
        assert_eq!(first.as_str(), "LOAN-20240305-001");
        assert_eq!(second.as_str(), "LOAN-20240305-002");
        assert_eq!(store.list_loans().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn derived_fields_need_an_existing_loan() {
        let store = MemoryStore::new();
        let err = store
            .write_derived_fields(&LoanId::from("LOAN-1"), &DerivedFields::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::NotFound);
    }

    #[tokio::test]
    async fn failing_upload_stores_nothing() {
        let store = MemoryStore::new();
        store.fail_uploads_of("b.jpg");
        let files = vec![
            AttachmentFile::new("a.jpg", vec![1]),
            AttachmentFile::new("b.jpg", vec![2]),
        ];
        let err = store.upload_files(files, "loan_Anil").await.unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::AttachmentFailed);
        assert!(store.uploaded_names().is_empty());
    }

    #[tokio::test]
    async fn uploads_are_named_in_order() {
        let store = MemoryStore::new();
        let files = vec![
            AttachmentFile::new("a.jpg", vec![1]),
            AttachmentFile::new("b.jpg", vec![2]),
        ];
        let links = store.upload_files(files, "loan_Anil").await.unwrap();
        assert_eq!(
            store.uploaded_names(),
            vec!["loan_Anil_1_a.jpg", "loan_Anil_2_b.jpg"]
        );
        assert_eq!(links[1], "memory://attachments/loan_Anil_2_b.jpg");
    }

    #[tokio::test]
    async fn expired_session_rejects_calls() {
        let store = MemoryStore::new();
        store.expire_session();
        assert!(!store.is_authenticated());
        let err = store.list_loans().await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn legacy_migration_backfills() {
        let loan = new_loan("Anil").into_loan(LoanId::from("LOAN-20240305-001"));
        let payment = Payment::new(
            date(2024, 4, 5),
            None,
            "Anil",
            Decimal::from(10),
            PaymentType::Interest,
            PaymentMethod::Cash,
        );
        let store = MemoryStore::new().with_legacy_rows(vec![loan], vec![payment]);
        assert_eq!(store.schema_version().await.unwrap(), SchemaVersion::LEGACY);

        let migration = store.migrate_schema().await.unwrap();
        assert_eq!(migration.backfilled_payments, 1);
        assert_eq!(migration.to, SchemaVersion::CURRENT);
        assert_eq!(
            store.payments()[0].loan_id,
            Some(LoanId::from("LOAN-20240305-001"))
        );

        let again = store.migrate_schema().await.unwrap();
        assert!(!again.changed());
    }
}
