//! Client error types.

use std::fmt;

use loanbook_store::StoreError;

use crate::service::ServiceError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Ledger operation failed.
    Service(ServiceError),
    /// IO error.
    Io(std::io::Error),
    /// The user has to sign in (again).
    AuthRequired(String),
    /// A command argument was rejected.
    InvalidInput(String),
    /// Action failed (opening a browser).
    Action(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Service(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::AuthRequired(msg) => write!(
                f,
                "authentication required: {} (run `loanbook auth login`)",
                msg
            ),
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Self::Action(msg) => write!(f, "action failed: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Service(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ServiceError> for ClientError {
    fn from(err: ServiceError) -> Self {
        if err.is_authentication() {
            let msg = match &err {
                ServiceError::Store(e) | ServiceError::Attachment(e) => e.message().to_string(),
                other => other.to_string(),
            };
            Self::AuthRequired(msg)
        } else {
            Self::Service(err)
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        ServiceError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_point_at_login() {
        let err = ClientError::from(StoreError::authentication("session expired"));
        assert!(matches!(err, ClientError::AuthRequired(_)));
        assert_eq!(
            err.to_string(),
            "authentication required: session expired (run `loanbook auth login`)"
        );
        let err = ClientError::from(ServiceError::NotSignedIn);
        assert_eq!(
            err.to_string(),
            "authentication required: not signed in (run `loanbook auth login`)"
        );
    }

    #[test]
    fn other_service_errors_keep_their_message() {
        let err = ClientError::from(ServiceError::UnknownBorrower("Sunita".into()));
        assert_eq!(err.to_string(), "no loan for borrower \"Sunita\"");
    }
}
