//! Sign-in session state.
//!
//! ```text
//! Unauthenticated --SignInStarted--> Authenticating --SignedIn--> Ready
//! Unauthenticated --Restored------------------------------------> Ready
//! Ready --SignedOut | AuthorizationRejected--> Unauthenticated
//! any --Failed--> Error --SignInStarted--> Authenticating
//! ```
//!
//! Every other pairing is rejected with a [`TransitionError`] and leaves the
//! state unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// The signed-in Google user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Ready(Principal),
    Error(String),
}

/// Something that happened to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The browser sign-in flow began.
    SignInStarted,
    /// Sign-in completed for this user.
    SignedIn(Principal),
    /// A saved session was loaded at startup.
    Restored(Principal),
    /// The user asked to sign out.
    SignedOut,
    /// A remote call was refused with HTTP 401.
    AuthorizationRejected,
    Failed(String),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::SignInStarted => "sign-in started",
            Self::SignedIn(_) => "signed in",
            Self::Restored(_) => "restored",
            Self::SignedOut => "signed out",
            Self::AuthorizationRejected => "authorization rejected",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply '{event}' while {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "signed out",
            Self::Authenticating => "signing in",
            Self::Ready(_) => "signed in",
            Self::Error(_) => "in error",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Ready(principal) => Some(principal),
            _ => None,
        }
    }

    /// Moves to the state `event` leads to.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), TransitionError> {
        let next = match (&*self, event) {
            (_, SessionEvent::Failed(message)) => Self::Error(message),
            (Self::Unauthenticated | Self::Error(_), SessionEvent::SignInStarted) => {
                Self::Authenticating
            }
            (Self::Authenticating, SessionEvent::SignedIn(principal))
            | (Self::Unauthenticated, SessionEvent::Restored(principal)) => {
                Self::Ready(principal)
            }
            (Self::Ready(_) | Self::Error(_), SessionEvent::SignedOut)
            | (Self::Ready(_), SessionEvent::AuthorizationRejected) => Self::Unauthenticated,
            (state, event) => {
                return Err(TransitionError {
                    state: state.name(),
                    event: event.name(),
                });
            }
        };

        info!(from = self.name(), to = next.name(), "session state changed");
        *self = next;
        Ok(())
    }
}
