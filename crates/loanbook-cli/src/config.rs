//! Client configuration.
//!
//! All settings live in a single `config.toml`, by default
//! `~/.config/loanbook/config.toml`:
//!
//! ```toml
//! [google]
//! client_id = "pass::google/loanbook-id"
//! client_secret = "env::LOANBOOK_CLIENT_SECRET"
//! spreadsheet_id = "1AbC..."    # optional, otherwise found or created
//!
//! [display]
//! currency_symbol = "₹"
//! ```
//!
//! Credential values support the secret references of [`crate::secret`].

use std::path::{Path, PathBuf};

use loanbook_core::{AmountFormat, LedgerFormatter};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the loanbook client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google Sheets and Drive settings.
    #[cfg(feature = "google")]
    pub google: Option<GoogleSettings>,

    /// Terminal output settings.
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Printed before every amount.
    pub currency_symbol: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            currency_symbol: "₹".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads `path`, or the default file when no path is given.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loanbook")
    }

    pub fn formatter(&self) -> LedgerFormatter {
        LedgerFormatter::new(AmountFormat::with_symbol(&self.display.currency_symbol))
    }
}

/// Google backend settings.
///
/// Only `client_id` and `client_secret` are required; everything else falls
/// back to the backend defaults.
#[cfg(feature = "google")]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Where the signed-in session is saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,

    /// Use this spreadsheet instead of finding or creating one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,

    /// Title of a spreadsheet created on first use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_name: Option<String>,

    /// Drive folder that receives attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,

    /// Request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[cfg(feature = "google")]
impl GoogleSettings {
    /// Resolves the credentials and builds the backend configuration.
    pub fn to_store_config(&self) -> Result<loanbook_store::google::GoogleConfig, String> {
        use loanbook_store::google::GoogleConfig;

        let credentials = self.resolve_credentials()?;
        let mut config = GoogleConfig::new(credentials)
            .with_spreadsheet_id(self.spreadsheet_id.clone());

        if let Some(ref path) = self.token_path {
            config = config.with_token_path(path);
        }
        if let Some(ref name) = self.spreadsheet_name {
            config = config.with_spreadsheet_name(name);
        }
        if let Some(ref name) = self.folder_name {
            config = config.with_folder_name(name);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(std::time::Duration::from_secs(secs));
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Resolves `client_id` and `client_secret`, expanding secret
    /// references.
    pub fn resolve_credentials(
        &self,
    ) -> Result<loanbook_store::google::OAuthCredentials, String> {
        use loanbook_store::google::OAuthCredentials;

        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            "Google credentials not found. Add client_id and client_secret under [google] \
             in config.toml, or run: loanbook auth login --credentials-file <path>"
                .to_string()
        })?;
        let raw_secret = self
            .client_secret
            .as_deref()
            .ok_or_else(|| "client_secret is missing from the [google] section".to_string())?;

        let client_id = crate::secret::resolve(raw_id)
            .map_err(|e| format!("failed to resolve client_id: {}", e))?;
        let client_secret = crate::secret::resolve(raw_secret)
            .map_err(|e| format!("failed to resolve client_secret: {}", e))?;

        Ok(OAuthCredentials::new(client_id, client_secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = ClientConfig::default();
        assert_eq!(config.display.currency_symbol, "₹");
        assert!(ClientConfig::default_path().ends_with("loanbook/config.toml"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn display_section_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\ncurrency_symbol = \"Rs \"\n").unwrap();

        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.display.currency_symbol, "Rs ");
    }

    #[test]
    fn broken_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ClientError::Config(_))
        ));
    }

    #[cfg(feature = "google")]
    mod google {
        use super::*;

        fn settings() -> GoogleSettings {
            GoogleSettings {
                client_id: Some("ledger.apps.googleusercontent.com".to_string()),
                client_secret: Some("secret".to_string()),
                ..Default::default()
            }
        }

        #[test]
        fn plain_credentials() {
            let creds = settings().resolve_credentials().unwrap();
            assert_eq!(creds.client_id, "ledger.apps.googleusercontent.com");
            assert_eq!(creds.client_secret, "secret");
        }

        #[test]
        fn env_credentials() {
            unsafe {
                std::env::set_var("_LB_TEST_CLIENT_ID", "env.apps.googleusercontent.com");
                std::env::set_var("_LB_TEST_CLIENT_SECRET", "env-secret");
            }
            let settings = GoogleSettings {
                client_id: Some("env::_LB_TEST_CLIENT_ID".to_string()),
                client_secret: Some("env::_LB_TEST_CLIENT_SECRET".to_string()),
                ..Default::default()
            };
            let creds = settings.resolve_credentials().unwrap();
            assert_eq!(creds.client_id, "env.apps.googleusercontent.com");
            assert_eq!(creds.client_secret, "env-secret");
            unsafe {
                std::env::remove_var("_LB_TEST_CLIENT_ID");
                std::env::remove_var("_LB_TEST_CLIENT_SECRET");
            }
        }

        #[test]
        fn missing_credentials() {
            let err = GoogleSettings::default().resolve_credentials().unwrap_err();
            assert!(err.contains("credentials not found"));

            let only_id = GoogleSettings {
                client_id: Some("x.apps.googleusercontent.com".to_string()),
                ..Default::default()
            };
            assert!(only_id.resolve_credentials().unwrap_err().contains("client_secret"));
        }

        #[test]
        fn store_config_applies_overrides() {
            let settings = GoogleSettings {
                token_path: Some(PathBuf::from("/tmp/lb-session.json")),
                spreadsheet_id: Some("sheet-123".to_string()),
                spreadsheet_name: Some("Family Loans".to_string()),
                folder_name: Some("Receipts".to_string()),
                timeout_secs: Some(5),
                ..settings()
            };
            let config = settings.to_store_config().unwrap();
            assert_eq!(config.token_path, PathBuf::from("/tmp/lb-session.json"));
            assert_eq!(config.spreadsheet_id.as_deref(), Some("sheet-123"));
            assert_eq!(config.spreadsheet_name, "Family Loans");
            assert_eq!(config.folder_name, "Receipts");
            assert_eq!(config.timeout.as_secs(), 5);
        }

        #[test]
        fn store_config_rejects_bad_client_id() {
            let settings = GoogleSettings {
                client_id: Some("not-a-google-id".to_string()),
                ..settings()
            };
            assert!(settings.to_store_config().is_err());
        }

        #[test]
        fn google_section_from_toml() {
            let config: ClientConfig = toml::from_str(
                r#"
                [google]
                client_id = "ledger.apps.googleusercontent.com"
                client_secret = "env::LOANBOOK_SECRET"
                spreadsheet_id = "abc"
                "#,
            )
            .unwrap();
            let google = config.google.unwrap();
            assert_eq!(google.client_secret.as_deref(), Some("env::LOANBOOK_SECRET"));
            assert_eq!(google.spreadsheet_id.as_deref(), Some("abc"));
            assert!(google.folder_name.is_none());
            assert_eq!(config.display.currency_symbol, "₹");
        }
    }
}
