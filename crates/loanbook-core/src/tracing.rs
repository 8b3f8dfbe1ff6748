//! Logging setup shared by the loanbook binaries.
//!
//! Logs go to stderr so command output on stdout stays clean for pipes.
//! `RUST_LOG` overrides the configured level when set.
//!
//! ```ignore
//! use loanbook_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::verbose())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crate targets that get the configured level by default.
const LOG_TARGETS: [&str; 4] = ["loanbook", "loanbook_cli", "loanbook_core", "loanbook_store"];

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Single-line human output
    #[default]
    Compact,
    /// Multi-line human output
    Pretty,
    /// One JSON object per line
    Json,
}

/// Configuration for [`init_tracing`]
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to loanbook targets when `RUST_LOG` is unset
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Include file and line of each event
    pub include_location: bool,
    pub include_timestamp: bool,
    /// Explicit filter directive; wins over `RUST_LOG` and `default_level`
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_timestamp: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Debug-level output with source locations, for `--debug`.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive used when neither `env_filter` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.default_level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter directive does
/// not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match config.env_filter {
        Some(ref filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.default_directive()))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.output_format {
        TracingOutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            let layer = if config.include_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            };
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        TracingOutputFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        TracingOutputFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_quiet_and_compact() {
        let config = TracingConfig::default();
        assert_eq!(config.default_level, Level::WARN);
        assert_eq!(config.output_format, TracingOutputFormat::Compact);
        assert!(!config.include_location);
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn verbose_enables_debug() {
        let config = TracingConfig::verbose();
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(config.include_location);
    }

    #[test]
    fn directive_covers_every_crate() {
        let config = TracingConfig::default().with_level(Level::INFO);
        assert_eq!(
            config.default_directive(),
            "loanbook=INFO,loanbook_cli=INFO,loanbook_core=INFO,loanbook_store=INFO"
        );
    }

    #[test]
    fn builder_methods() {
        let config = TracingConfig::default()
            .with_format(TracingOutputFormat::Json)
            .with_env_filter("loanbook_store=trace");
        assert_eq!(config.output_format, TracingOutputFormat::Json);
        assert_eq!(config.env_filter.as_deref(), Some("loanbook_store=trace"));
    }
}
