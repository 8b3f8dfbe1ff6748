//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Prints the effective configuration as TOML.
pub fn dump(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Checks that the Google settings resolve to a usable backend
/// configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    #[cfg(feature = "google")]
    match config.google {
        Some(ref google) => {
            google
                .to_store_config()
                .map_err(|e| ClientError::Config(format!("invalid [google] settings: {}", e)))?;
            println!("Google settings are valid.");
        }
        None => println!("No [google] section yet; `loanbook auth login` will add one."),
    }

    if config.display.currency_symbol.chars().any(char::is_control) {
        return Err(ClientError::Config(
            "display.currency_symbol must not contain control characters".to_string(),
        ));
    }

    println!("Configuration is valid.");
    Ok(())
}

pub fn path(config_path: &Path) -> ClientResult<()> {
    let marker = if config_path.exists() { "" } else { " (not created yet)" };
    println!("config: {}{}", config_path.display(), marker);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplaySettings;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn control_characters_in_symbol_are_rejected() {
        let config = ClientConfig {
            display: DisplaySettings {
                currency_symbol: "\u{7}".to_string(),
            },
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ClientError::Config(_))));
    }

    #[cfg(feature = "google")]
    #[test]
    fn unusable_google_settings_are_rejected() {
        let config = ClientConfig {
            google: Some(crate::config::GoogleSettings {
                client_id: Some("not-google".to_string()),
                client_secret: Some("s".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }
}
