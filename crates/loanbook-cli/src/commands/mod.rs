//! Subcommand implementations.

#[cfg(feature = "google")]
pub mod auth;
pub mod config;
pub mod ledger;
pub mod loan;
pub mod payment;

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use loanbook_store::AttachmentFile;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::service::LedgerService;

/// Builds the service over the configured backend and upgrades a legacy
/// spreadsheet before handing it out.
pub async fn open_ledger(config: &ClientConfig) -> ClientResult<LedgerService> {
    let service = connect(config)?;
    if let Some(report) = service.open().await? {
        eprintln!(
            "Upgraded spreadsheet from {} to {}: linked {} payments, updated {} loans.",
            report.migration.from,
            report.migration.to,
            report.migration.backfilled_payments,
            report.recomputed
        );
    }
    Ok(service)
}

/// Builds the service without touching the remote.
#[cfg(feature = "google")]
pub fn connect(config: &ClientConfig) -> ClientResult<LedgerService> {
    let backend = google_backend(config)?;
    Ok(LedgerService::new(
        backend.sheets,
        backend.drive,
        backend.identity,
    ))
}

#[cfg(not(feature = "google"))]
pub fn connect(_config: &ClientConfig) -> ClientResult<LedgerService> {
    Err(ClientError::Config(
        "built without a storage backend, enable the `google` feature".to_string(),
    ))
}

#[cfg(feature = "google")]
pub fn google_backend(config: &ClientConfig) -> ClientResult<loanbook_store::google::GoogleBackend> {
    let settings = config.google.as_ref().ok_or_else(|| {
        ClientError::AuthRequired("no [google] section in the configuration".to_string())
    })?;
    let store_config = settings.to_store_config().map_err(ClientError::Config)?;
    Ok(loanbook_store::google::GoogleBackend::new(store_config)?)
}

/// Reads every file named on the command line before anything is sent.
pub async fn read_attachments(paths: &[PathBuf]) -> ClientResult<Vec<AttachmentFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = AttachmentFile::read(path)
            .await
            .map_err(|e| ClientError::InvalidInput(e.message().to_string()))?;
        files.push(file);
    }
    Ok(files)
}

pub fn print_json<T: Serialize>(value: &T) -> ClientResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ClientError::Action(format!("failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}
