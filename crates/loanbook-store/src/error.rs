//! Errors raised by ledger, attachment and identity backends.

use std::fmt;

use loanbook_core::SchemaError;
use thiserror::Error;

/// Broad category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorCode {
    /// No usable credentials, or the remote rejected them (HTTP 401).
    AuthenticationFailed,
    /// Credentials are valid but lack permission (HTTP 403).
    AuthorizationFailed,
    /// Connection failed, timed out or could not resolve.
    NetworkError,
    /// Too many requests (HTTP 429).
    RateLimited,
    /// Remote returned 5xx.
    ServerError,
    /// Response body did not have the expected shape.
    InvalidResponse,
    /// Resource does not exist (HTTP 404).
    NotFound,
    /// Request was rejected as malformed (HTTP 400).
    BadRequest,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// Stored sheet layout cannot be read or is from a newer release.
    SchemaMismatch,
    /// An attachment could not be uploaded.
    AttachmentFailed,
    /// Local I/O failure or unexpected state.
    InternalError,
}

impl StoreErrorCode {
    /// Returns true for failures that may go away on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::SchemaMismatch => "schema_mismatch",
            Self::AttachmentFailed => "attachment_failed",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed store operation.
#[derive(Debug, Error)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    /// Backend that raised the error, e.g. `"sheets"` or `"drive"`.
    backend: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            backend: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::ConfigurationError, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::SchemaMismatch, message)
    }

    pub fn attachment(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::AttachmentFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InternalError, message)
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Returns true if the user has to sign in again.
    pub fn is_authentication(&self) -> bool {
        self.code == StoreErrorCode::AuthenticationFailed
    }

    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref backend) = self.backend {
            write!(f, "[{}] ", backend)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<SchemaError> for StoreError {
    fn from(err: SchemaError) -> Self {
        Self::schema(err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string()).with_source(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes() {
        assert!(StoreErrorCode::NetworkError.is_transient());
        assert!(StoreErrorCode::RateLimited.is_transient());
        assert!(StoreErrorCode::ServerError.is_transient());
        assert!(!StoreErrorCode::AuthenticationFailed.is_transient());
        assert!(!StoreErrorCode::AttachmentFailed.is_transient());
    }

    #[test]
    fn authentication_is_flagged() {
        let err = StoreError::authentication("token expired");
        assert!(err.is_authentication());
        assert_eq!(err.message(), "token expired");
        assert!(err.backend().is_none());
        assert!(!StoreError::authorization("forbidden").is_authentication());
    }

    #[test]
    fn display_includes_backend() {
        let err = StoreError::rate_limited("slow down").with_backend("sheets");
        assert_eq!(err.to_string(), "[sheets] rate_limited: slow down");
    }

    #[test]
    fn schema_errors_convert() {
        use std::error::Error;
        let err: StoreError = SchemaError::EmptyHeader { sheet: "Loans" }.into();
        assert_eq!(err.code(), StoreErrorCode::SchemaMismatch);
        assert!(err.source().is_some());
    }
}
