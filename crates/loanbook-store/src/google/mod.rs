//! Google backend: Sheets for the ledger, Drive for attachments.
//!
//! # Sign-in
//!
//! The user registers their own OAuth desktop client (Google requires one per
//! app) and passes its id and secret in the config. `auth login` runs the
//! PKCE flow in the browser; the tokens and the user's profile are saved so
//! later commands start signed in.
//!
//! # Resources
//!
//! On first use the backend finds or creates the spreadsheet and the
//! attachment folder, and remembers their ids in a small cache file.
//!
//! ```ignore
//! use loanbook_store::google::{GoogleBackend, GoogleConfig, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::new(
//!     "your-client-id.apps.googleusercontent.com",
//!     "your-client-secret",
//! );
//! let backend = GoogleBackend::new(GoogleConfig::new(credentials))?;
//! if !backend.identity.is_authenticated() {
//!     backend.identity.sign_in().await?;
//! }
//! let loans = backend.sheets.list_loans().await?;
//! ```

mod config;
mod drive;
mod http;
mod identity;
mod oauth;
mod sheets;
mod state;
mod tokens;

use std::sync::Arc;

pub use config::{GoogleConfig, OAuthCredentials};
pub use drive::DriveStore;
pub use http::AuthorizedClient;
pub use identity::GoogleIdentity;
pub use oauth::{OAuthClient, PkceFlow};
pub use sheets::SheetsStore;
pub use state::{CachedResources, ResourceCache};
pub use tokens::{SavedSession, SessionStorage, TokenInfo};

use crate::error::StoreResult;

/// The three Google stores wired to one identity and one resource cache.
pub struct GoogleBackend {
    pub identity: Arc<GoogleIdentity>,
    pub sheets: Arc<SheetsStore>,
    pub drive: Arc<DriveStore>,
    pub cache: Arc<ResourceCache>,
}

impl GoogleBackend {
    /// Restores any saved session. Nothing is fetched until a store is used.
    pub fn new(config: GoogleConfig) -> StoreResult<Self> {
        let identity = Arc::new(GoogleIdentity::new(config.clone())?);
        let cache = Arc::new(ResourceCache::load(&config.cache_path));

        let sheets_client = AuthorizedClient::new(identity.clone(), config.timeout, "sheets")?;
        let drive_client = AuthorizedClient::new(identity.clone(), config.timeout, "drive")?;

        Ok(Self {
            sheets: Arc::new(SheetsStore::new(sheets_client, config.clone(), cache.clone())),
            drive: Arc::new(DriveStore::new(drive_client, config, cache.clone())),
            identity,
            cache,
        })
    }
}
