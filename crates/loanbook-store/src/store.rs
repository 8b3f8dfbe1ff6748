//! Storage seams: the ledger tables, attachment files and the signed-in user.
//!
//! Every remote operation returns a [`BoxFuture`] so the traits stay object
//! safe and the CLI can hold `Arc<dyn LedgerStore>` regardless of backend.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use loanbook_core::{DerivedFields, Loan, LoanId, NewLoan, Payment, Principal, SchemaVersion};

use crate::error::{StoreError, StoreResult};

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The loan and payment tables.
///
/// Tables are append-only apart from [`LedgerStore::update_loan`] and the
/// derived columns written by [`LedgerStore::write_derived_fields`].
pub trait LedgerStore: Send + Sync {
    /// Backend name used in logs and errors, e.g. `"sheets"`.
    fn name(&self) -> &str;

    /// Every readable loan in sheet order. Unreadable rows are skipped.
    fn list_loans(&self) -> BoxFuture<'_, StoreResult<Vec<Loan>>>;

    /// Every readable payment in sheet order. Unreadable rows are skipped.
    fn list_payments(&self) -> BoxFuture<'_, StoreResult<Vec<Payment>>>;

    /// Assigns the next loan id for today and appends the loan.
    fn append_loan(&self, loan: NewLoan) -> BoxFuture<'_, StoreResult<LoanId>>;

    fn append_payment(&self, payment: Payment) -> BoxFuture<'_, StoreResult<()>>;

    /// Overwrites the derived columns of one loan.
    ///
    /// Fails with `NotFound` if no loan has the id.
    fn write_derived_fields<'a>(
        &'a self,
        loan_id: &'a LoanId,
        derived: &'a DerivedFields,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Rewrites every column of an existing loan row.
    fn update_loan<'a>(&'a self, loan: &'a Loan) -> BoxFuture<'a, StoreResult<()>>;

    /// Layout version of the underlying tables.
    fn schema_version(&self) -> BoxFuture<'_, StoreResult<SchemaVersion>>;

    /// Brings the tables to the current layout.
    ///
    /// Derived fields are not recomputed here; the caller does that once the
    /// payment links are in place.
    fn migrate_schema(&self) -> BoxFuture<'_, StoreResult<SchemaMigration>>;

    /// Link a person can open to view the tables.
    fn web_url(&self) -> BoxFuture<'_, StoreResult<String>>;
}

/// Outcome of [`LedgerStore::migrate_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMigration {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    /// Legacy payments that were linked to a loan id.
    pub backfilled_payments: usize,
}

impl SchemaMigration {
    /// A migration that found nothing to do.
    pub fn up_to_date(version: SchemaVersion) -> Self {
        Self {
            from: version,
            to: version,
            backfilled_payments: 0,
        }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to || self.backfilled_payments > 0
    }
}

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AttachmentFile {
    /// Wraps `bytes`, guessing the MIME type from the file extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_type_for(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Reads a file from disk.
    pub async fn read(path: &Path) -> StoreResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StoreError::attachment(format!("not a file path: {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            StoreError::attachment(format!("failed to read {}: {}", path.display(), e))
                .with_source(e)
        })?;
        Ok(Self::new(file_name, bytes))
    }
}

/// MIME type for the image and document types receipts come in.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Remote storage for receipts and promissory notes.
pub trait AttachmentStore: Send + Sync {
    fn name(&self) -> &str;

    /// Uploads every file and returns one shareable link per file, in order.
    ///
    /// Files are named `{prefix}_{n}_{file_name}`. The batch fails as a
    /// unit: if any upload fails the error is returned and no links are.
    fn upload_files<'a>(
        &'a self,
        files: Vec<AttachmentFile>,
        name_prefix: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<String>>>;

    /// Link a person can open to browse the uploaded files.
    fn web_url(&self) -> BoxFuture<'_, StoreResult<String>>;
}

/// The signed-in user and their credentials.
pub trait Identity: Send + Sync {
    /// Returns true if credentials are present, even if the access token
    /// needs a refresh.
    fn is_authenticated(&self) -> bool;

    /// The signed-in user, if known.
    fn principal(&self) -> Option<Principal>;

    /// A usable access token, refreshed first if it has expired.
    fn access_token(&self) -> BoxFuture<'_, StoreResult<String>>;

    /// Forgets the credentials locally and revokes them remotely where the
    /// backend supports it.
    fn sign_out(&self) -> BoxFuture<'_, StoreResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_type_for("receipt.JPG"), "image/jpeg");
        assert_eq!(mime_type_for("note.pdf"), "application/pdf");
        assert_eq!(mime_type_for("scan.heic"), "image/heic");
        assert_eq!(mime_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn attachment_file_guesses_mime() {
        let file = AttachmentFile::new("upi.png", vec![1, 2, 3]);
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.bytes.len(), 3);
    }

    #[tokio::test]
    async fn attachment_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let file = AttachmentFile::read(&path).await.unwrap();
        assert_eq!(file.file_name, "note.jpg");
        assert_eq!(file.bytes, b"jpeg");

        let missing = AttachmentFile::read(&dir.path().join("gone.png")).await;
        assert!(missing.is_err());
    }

    #[test]
    fn migration_change_detection() {
        let none = SchemaMigration::up_to_date(SchemaVersion::CURRENT);
        assert!(!none.changed());
        let upgraded = SchemaMigration {
            from: SchemaVersion::LEGACY,
            to: SchemaVersion::CURRENT,
            backfilled_payments: 0,
        };
        assert!(upgraded.changed());
    }
}
