//! Core types: loans, payments, ledger aggregation, sheet schema, session

pub mod attachments;
pub mod format;
pub mod ledger;
pub mod loan_id;
pub mod migration;
pub mod model;
pub mod month;
pub mod record;
pub mod schema;
pub mod session;
pub mod tracing;

pub use attachments::{decode_links, drive_view_link, encode_links, upload_name};
pub use format::{format_amount, format_date, status_badge, AmountFormat, LedgerFormatter};
pub use ledger::{derive_fields, payments_for, DerivedFields, PortfolioSummary};
pub use loan_id::{LoanId, LoanIdGenerator};
pub use migration::{plan_loan_id_backfill, Backfill, SchemaVersion};
pub use model::{
    borrower_key, Contact, Loan, LoanStatus, NewLoan, ParseEnumError, Payment, PaymentMethod,
    PaymentType, ValidationError,
};
pub use month::YearMonth;
pub use record::{CellValue, LoanRecord, PaymentRecord, RowError};
pub use schema::{HeaderMap, SchemaError, TableSchema, SCHEMA_VERSION};
pub use session::{Principal, SessionEvent, SessionState, TransitionError};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
