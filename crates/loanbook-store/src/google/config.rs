//! Google backend configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{StoreError, StoreResult};

/// OAuth 2.0 client registered in Google Cloud Console.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// The JSON file Google Cloud Console offers for download.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads a downloaded `client_secret_*.json` file.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
            StoreError::configuration(format!("failed to parse credentials file: {}", e))
        })?;
        file.installed
            .or(file.web)
            .map(|section| Self::new(section.client_id, section.client_secret))
            .ok_or_else(|| {
                StoreError::configuration(
                    "credentials file has neither an 'installed' nor a 'web' section",
                )
            })
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(StoreError::configuration("google client_id is required"));
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err(StoreError::configuration(
                "google client_id should end with .apps.googleusercontent.com",
            ));
        }
        if self.client_secret.trim().is_empty() {
            return Err(StoreError::configuration("google client_secret is required"));
        }
        Ok(())
    }
}

/// Everything the Google backend needs to reach the user's spreadsheet and
/// attachment folder.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    /// Saved tokens and the signed-in user.
    pub token_path: PathBuf,
    /// Remembered spreadsheet and folder ids.
    pub cache_path: PathBuf,
    /// Use this spreadsheet instead of finding or creating one.
    pub spreadsheet_id: Option<String>,
    /// Title given to a newly created spreadsheet.
    pub spreadsheet_name: String,
    /// Drive folder that receives uploads.
    pub folder_name: String,
    pub timeout: Duration,
    /// Ports tried for the sign-in redirect listener.
    pub loopback_port_range: (u16, u16),
    pub scopes: Vec<String>,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_SPREADSHEET_NAME: &'static str = "Loan Data";
    pub const DEFAULT_FOLDER_NAME: &'static str = "Loan Attachments";

    /// Sheets, files this app creates, and the user's name and email.
    pub const DEFAULT_SCOPES: [&'static str; 4] = [
        "https://www.googleapis.com/auth/spreadsheets",
        "https://www.googleapis.com/auth/drive.file",
        "https://www.googleapis.com/auth/userinfo.profile",
        "https://www.googleapis.com/auth/userinfo.email",
    ];

    pub fn new(credentials: OAuthCredentials) -> Self {
        let data_dir = Self::default_data_dir();
        Self {
            credentials,
            token_path: data_dir.join("google-session.json"),
            cache_path: data_dir.join("resources.json"),
            spreadsheet_id: None,
            spreadsheet_name: Self::DEFAULT_SPREADSHEET_NAME.to_string(),
            folder_name: Self::DEFAULT_FOLDER_NAME.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            loopback_port_range: (8080, 8090),
            scopes: Self::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `~/.local/share/loanbook`, or `./loanbook` without a home directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loanbook")
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_spreadsheet_id(mut self, id: Option<String>) -> Self {
        self.spreadsheet_id = id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_spreadsheet_name(mut self, name: impl Into<String>) -> Self {
        self.spreadsheet_name = name.into();
        self
    }

    pub fn with_folder_name(mut self, name: impl Into<String>) -> Self {
        self.folder_name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        self.credentials.validate()?;
        if self.spreadsheet_name.trim().is_empty() {
            return Err(StoreError::configuration("spreadsheet name must not be empty"));
        }
        if self.folder_name.trim().is_empty() {
            return Err(StoreError::configuration("folder name must not be empty"));
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(StoreError::configuration("invalid loopback port range"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new("ledger.apps.googleusercontent.com", "secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "secret").validate().is_err());
        assert!(OAuthCredentials::new("bad-id", "secret").validate().is_err());
        assert!(
            OAuthCredentials::new("x.apps.googleusercontent.com", " ")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn defaults_match_the_legacy_names() {
        let config = GoogleConfig::new(credentials());
        assert_eq!(config.spreadsheet_name, "Loan Data");
        assert_eq!(config.folder_name, "Loan Attachments");
        assert_eq!(config.scopes.len(), 4);
        assert!(config.scopes[1].ends_with("drive.file"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_spreadsheet_id_is_ignored() {
        let config = GoogleConfig::new(credentials()).with_spreadsheet_id(Some("  ".into()));
        assert!(config.spreadsheet_id.is_none());
    }

    #[test]
    fn invalid_port_range() {
        let config = GoogleConfig::new(credentials()).with_loopback_port_range(9000, 8000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_from_downloaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secret.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"a.apps.googleusercontent.com","client_secret":"s","project_id":"p"}}"#,
        )
        .unwrap();
        let creds = OAuthCredentials::from_file(&path).unwrap();
        assert_eq!(creds.client_id, "a.apps.googleusercontent.com");

        std::fs::write(&path, r#"{"other":{}}"#).unwrap();
        assert!(OAuthCredentials::from_file(&path).is_err());
    }
}
