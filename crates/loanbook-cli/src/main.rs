//! loanbook CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use loanbook_core::{TracingConfig, init_tracing};

use loanbook_cli::cli::{AuthAction, Cli, Command, ConfigAction};
use loanbook_cli::commands;
use loanbook_cli::config::ClientConfig;
use loanbook_cli::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = if cli.debug {
        TracingConfig::verbose()
    } else {
        TracingConfig::default()
    }
    .with_format(cli.log_format.into());
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    let config_path = cli.config.unwrap_or_else(ClientConfig::default_path);

    match cli.command {
        Command::Auth { action } => auth(action, &config, &config_path).await,
        Command::Loan { action } => commands::loan::run(action, &config).await,
        Command::Payment { action } => commands::payment::run(action, &config).await,
        Command::Recompute { loan_id } => commands::ledger::recompute(loan_id, &config).await,
        Command::Migrate => commands::ledger::migrate(&config).await,
        Command::Open { target } => commands::ledger::open(target, &config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}

#[cfg(feature = "google")]
async fn auth(
    action: AuthAction,
    config: &ClientConfig,
    config_path: &std::path::Path,
) -> ClientResult<()> {
    match action {
        AuthAction::Login {
            client_id,
            client_secret,
            credentials_file,
            force,
        } => {
            commands::auth::login(
                client_id,
                client_secret,
                credentials_file,
                force,
                config,
                config_path,
            )
            .await
        }
        AuthAction::Logout => commands::auth::logout(config).await,
        AuthAction::Status => commands::auth::status(config).await,
    }
}

#[cfg(not(feature = "google"))]
async fn auth(
    _action: AuthAction,
    _config: &ClientConfig,
    _config_path: &std::path::Path,
) -> ClientResult<()> {
    Err(loanbook_cli::ClientError::Config(
        "built without Google support".to_string(),
    ))
}
