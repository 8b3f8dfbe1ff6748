//! The `loanbook` command-line tool.
//!
//! Commands go through [`service::LedgerService`], which works against any
//! [`loanbook_store::LedgerStore`]; the binary wires it to Google Sheets and
//! Drive.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod service;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use service::{LedgerService, ServiceError, ServiceResult};
