//! Google sign-in commands.

use std::path::{Path, PathBuf};

use loanbook_core::SessionState;
use loanbook_store::Identity;
use loanbook_store::google::{GoogleBackend, OAuthCredentials};
use tracing::{info, warn};

use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};
use crate::service::LedgerService;

/// Signs in with Google and prepares the ledger.
///
/// Credentials come from CLI flags, a `--credentials-file`, or
/// `config.toml`. Credentials given on the command line are written to
/// `config_path` so later commands find them.
pub async fn login(
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    force: bool,
    config: &ClientConfig,
    config_path: &Path,
) -> ClientResult<()> {
    let (final_client_id, final_client_secret, source) = resolve_google_credentials(
        client_id,
        client_secret,
        credentials_file,
        config.google.as_ref(),
    )?;

    let settings = GoogleSettings {
        client_id: Some(final_client_id.clone()),
        client_secret: Some(final_client_secret.clone()),
        ..config.google.clone().unwrap_or_default()
    };
    let store_config = settings.to_store_config().map_err(|e| {
        ClientError::Config(format!("invalid Google credentials: {}", e))
    })?;
    let backend = GoogleBackend::new(store_config)?;

    if backend.identity.is_authenticated() && !force {
        save_credentials_to_config(config_path, &final_client_id, &final_client_secret, &source);
        if let Some(principal) = backend.identity.principal() {
            println!("Already signed in as {}.", principal);
        }
        println!("Use --force to sign in again.");
        return Ok(());
    }

    println!("A browser window will open to sign in with Google.");
    println!("If it doesn't, open the URL printed below.");
    println!();

    let principal = backend.identity.sign_in().await?;
    save_credentials_to_config(config_path, &final_client_id, &final_client_secret, &source);
    println!("Signed in as {}.", principal);

    let service = LedgerService::new(
        backend.sheets.clone(),
        backend.drive.clone(),
        backend.identity.clone(),
    );
    service.open().await?;
    println!("Ledger: {}", service.ledger_url().await?);
    Ok(())
}

/// Revokes the saved session and deletes it.
pub async fn logout(config: &ClientConfig) -> ClientResult<()> {
    let backend = super::google_backend(config)?;
    if !backend.identity.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }
    backend.identity.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

pub async fn status(config: &ClientConfig) -> ClientResult<()> {
    let backend = super::google_backend(config)?;
    match backend.identity.state() {
        SessionState::Ready(principal) => println!("Signed in as {}.", principal),
        SessionState::Error(reason) => {
            println!("Saved session could not be used: {}", reason);
            println!("Run `loanbook auth login` to sign in again.");
        }
        SessionState::Unauthenticated | SessionState::Authenticating => {
            println!("Not signed in. Run `loanbook auth login`.");
        }
    }
    if let Some(id) = backend.cache.spreadsheet_id() {
        println!("Spreadsheet: https://docs.google.com/spreadsheets/d/{}/edit", id);
    }
    Ok(())
}

/// Where the credentials were resolved from.
#[derive(Debug, PartialEq)]
enum CredentialSource {
    /// `--client-id`/`--client-secret` or `--credentials-file`.
    Cli,
    /// Already in config.toml.
    Config,
}

/// Writes the credentials under `[google]` in `config_path`, keeping
/// the rest of the file as it is.
///
/// Credentials that already came from the file are left alone. Failures
/// are logged, since sign-in itself succeeded.
fn save_credentials_to_config(
    config_path: &Path,
    client_id: &str,
    client_secret: &str,
    source: &CredentialSource,
) {
    if *source == CredentialSource::Config {
        return;
    }

    let content = std::fs::read_to_string(config_path).unwrap_or_default();
    let mut doc = match content.parse::<toml_edit::DocumentMut>() {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "could not parse config for writing");
            return;
        }
    };

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    if let Some(google) = doc["google"].as_table_mut() {
        google["client_id"] = toml_edit::value(client_id);
        google["client_secret"] = toml_edit::value(client_secret);
    }

    if let Some(parent) = config_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "could not create config directory");
        return;
    }

    match std::fs::write(config_path, doc.to_string()) {
        Ok(()) => {
            info!(path = %config_path.display(), "credentials saved");
            println!("Credentials saved to {}", config_path.display());
        }
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "could not save credentials");
        }
    }
}

/// Resolves Google credentials from multiple sources.
///
/// Priority (highest to lowest):
/// 1. `--client-id` + `--client-secret`
/// 2. `--credentials-file` (Google Cloud Console JSON)
/// 3. `[google]` in config.toml, with secret references expanded
fn resolve_google_credentials(
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    cli_credentials_file: Option<PathBuf>,
    config_google: Option<&GoogleSettings>,
) -> ClientResult<(String, String, CredentialSource)> {
    if let (Some(id), Some(secret)) = (&cli_client_id, &cli_client_secret) {
        return Ok((id.clone(), secret.clone(), CredentialSource::Cli));
    }

    if let Some(ref path) = cli_credentials_file {
        let creds = OAuthCredentials::from_file(path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        return Ok((creds.client_id, creds.client_secret, CredentialSource::Cli));
    }

    if let Some(google) = config_google
        && google.client_id.is_some()
        && google.client_secret.is_some()
    {
        let creds = google.resolve_credentials().map_err(|e| {
            ClientError::Config(format!(
                "failed to resolve Google credentials from config: {}",
                e
            ))
        })?;
        return Ok((creds.client_id, creds.client_secret, CredentialSource::Config));
    }

    if cli_client_id.is_some() || cli_client_secret.is_some() {
        return Err(ClientError::Config(
            "both --client-id and --client-secret are required when passing credentials"
                .to_string(),
        ));
    }

    Err(ClientError::Config(format!(
        "Google credentials are required. Provide them with:\n  \
         - client_id + client_secret under [google] in {}\n  \
         - --client-id and --client-secret\n  \
         - --credentials-file (the JSON from Google Cloud Console)\n  \
         - GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
        ClientConfig::default_path().display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_from_cli() {
        let (id, secret, source) = resolve_google_credentials(
            Some("cli.apps.googleusercontent.com".to_string()),
            Some("cli-secret".to_string()),
            None,
            None,
        )
        .unwrap();
        assert_eq!(id, "cli.apps.googleusercontent.com");
        assert_eq!(secret, "cli-secret");
        assert_eq!(source, CredentialSource::Cli);
    }

    #[test]
    fn cli_overrides_config() {
        let settings = GoogleSettings {
            client_id: Some("config.apps.googleusercontent.com".to_string()),
            client_secret: Some("config-secret".to_string()),
            ..Default::default()
        };
        let (id, _, source) = resolve_google_credentials(
            Some("cli.apps.googleusercontent.com".to_string()),
            Some("cli-secret".to_string()),
            None,
            Some(&settings),
        )
        .unwrap();
        assert_eq!(id, "cli.apps.googleusercontent.com");
        assert_eq!(source, CredentialSource::Cli);

        let (id, _, source) =
            resolve_google_credentials(None, None, None, Some(&settings)).unwrap();
        assert_eq!(id, "config.apps.googleusercontent.com");
        assert_eq!(source, CredentialSource::Config);
    }

    #[test]
    fn credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secret.json");
        std::fs::write(
            &path,
            r#"{"installed": {"client_id": "file.apps.googleusercontent.com", "client_secret": "file-secret"}}"#,
        )
        .unwrap();

        let (id, secret, source) =
            resolve_google_credentials(None, None, Some(path), None).unwrap();
        assert_eq!(id, "file.apps.googleusercontent.com");
        assert_eq!(secret, "file-secret");
        assert_eq!(source, CredentialSource::Cli);
    }

    #[test]
    fn partial_or_missing_credentials_fail() {
        assert!(
            resolve_google_credentials(Some("id".to_string()), None, None, None).is_err()
        );
        assert!(
            resolve_google_credentials(None, Some("secret".to_string()), None, None).is_err()
        );
        assert!(resolve_google_credentials(None, None, None, None).is_err());
    }

    #[test]
    fn saving_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "# my ledger\n[display]\ncurrency_symbol = \"Rs \"\n\n[google]\nspreadsheet_id = \"abc\"\n",
        )
        .unwrap();

        save_credentials_to_config(
            &path,
            "saved.apps.googleusercontent.com",
            "saved-secret",
            &CredentialSource::Cli,
        );

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# my ledger"));
        let reloaded: ClientConfig = toml::from_str(&content).unwrap();
        let google = reloaded.google.unwrap();
        assert_eq!(google.client_id.as_deref(), Some("saved.apps.googleusercontent.com"));
        assert_eq!(google.client_secret.as_deref(), Some("saved-secret"));
        assert_eq!(google.spreadsheet_id.as_deref(), Some("abc"));
        assert_eq!(reloaded.display.currency_symbol, "Rs ");
    }

    #[test]
    fn saving_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        save_credentials_to_config(&path, "a.apps.googleusercontent.com", "b", &CredentialSource::Cli);
        let reloaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(
            reloaded.google.unwrap().client_secret.as_deref(),
            Some("b")
        );
    }

    #[test]
    fn config_credentials_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        save_credentials_to_config(&path, "id", "secret", &CredentialSource::Config);
        assert!(!path.exists());
    }
}
