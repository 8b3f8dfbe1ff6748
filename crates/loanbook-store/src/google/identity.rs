//! The signed-in Google account.

use std::sync::{Mutex, PoisonError};

use loanbook_core::{Principal, SessionEvent, SessionState};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{BoxFuture, Identity};

use super::config::GoogleConfig;
use super::oauth::OAuthClient;
use super::tokens::{SavedSession, SessionStorage};

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    name: String,
    email: String,
    #[serde(default)]
    picture: Option<String>,
}

impl From<UserInfo> for Principal {
    fn from(info: UserInfo) -> Self {
        Self {
            name: info.name,
            email: info.email,
            picture_url: info.picture,
        }
    }
}

/// Google sign-in, token refresh and sign-out.
///
/// A saved session is restored on construction, so a process started after
/// `auth login` is ready without opening a browser.
pub struct GoogleIdentity {
    config: GoogleConfig,
    storage: SessionStorage,
    oauth: OAuthClient,
    http: reqwest::Client,
    state: Mutex<SessionState>,
    /// Serializes refreshes so concurrent callers do not all hit the token
    /// endpoint.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl GoogleIdentity {
    pub fn new(config: GoogleConfig) -> StoreResult<Self> {
        config.validate()?;

        let storage = SessionStorage::new(&config.token_path);
        let mut state = SessionState::default();
        match storage.load() {
            Ok(true) => match storage.principal() {
                Some(principal) if !storage.needs_reauth(&config.scopes) => {
                    apply(&mut state, SessionEvent::Restored(principal));
                }
                _ => {
                    info!("saved session lacks required permissions, sign in again");
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "ignoring unreadable saved session");
                apply(&mut state, SessionEvent::Failed(e.to_string()));
            }
        }

        let oauth = OAuthClient::new(config.credentials.clone(), config.timeout)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            storage,
            oauth,
            http,
            state: Mutex::new(state),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn transition(&self, event: SessionEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state, event);
    }

    /// Opens the browser sign-in, then saves the tokens and the user's
    /// profile.
    pub async fn sign_in(&self) -> StoreResult<Principal> {
        // Sign-in from Ready means switching accounts; drop the old session.
        if self.state().is_ready() {
            self.transition(SessionEvent::SignedOut);
        }
        self.transition(SessionEvent::SignInStarted);

        match self.complete_sign_in().await {
            Ok(principal) => {
                self.transition(SessionEvent::SignedIn(principal.clone()));
                info!(user = %principal, "signed in");
                Ok(principal)
            }
            Err(e) => {
                self.transition(SessionEvent::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn complete_sign_in(&self) -> StoreResult<Principal> {
        let tokens = self
            .oauth
            .authorize(&self.config.scopes, self.config.loopback_port_range)
            .await?;
        let principal = self.fetch_principal(&tokens.access_token).await?;
        self.storage.set(SavedSession {
            tokens,
            principal: Some(principal.clone()),
        })?;
        Ok(principal)
    }

    async fn fetch_principal(&self, access_token: &str) -> StoreResult<Principal> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| StoreError::network(format!("userinfo request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(StoreError::authentication(format!(
                "failed to read account profile ({})",
                response.status()
            )));
        }
        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| StoreError::invalid_response(format!("invalid userinfo: {}", e)))?;
        Ok(info.into())
    }

    /// Drops the session after the remote refused the access token.
    pub(crate) fn reject(&self) {
        warn!("access token was rejected, signing out");
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "failed to remove saved session");
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_ready() {
            apply(&mut state, SessionEvent::AuthorizationRejected);
        } else {
            *state = SessionState::Unauthenticated;
        }
    }

    async fn valid_access_token(&self) -> StoreResult<String> {
        let tokens = self
            .storage
            .tokens()
            .ok_or_else(|| StoreError::authentication("not signed in"))?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let tokens = self
            .storage
            .tokens()
            .ok_or_else(|| StoreError::authentication("not signed in"))?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }

        let refresh_token = tokens
            .refresh_token
            .ok_or_else(|| StoreError::authentication("session expired"))?;
        debug!("access token expired, refreshing");
        match self.oauth.refresh(&refresh_token).await {
            Ok(refreshed) => {
                let tokens = self.storage.update_tokens(
                    &refreshed.access_token,
                    refreshed.expires_in,
                    refreshed.refresh_token,
                )?;
                Ok(tokens.access_token)
            }
            Err(e) if e.is_authentication() => {
                self.reject();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn revoke_and_clear(&self) -> StoreResult<()> {
        if let Some(tokens) = self.storage.tokens() {
            let token = tokens.refresh_token.unwrap_or(tokens.access_token);
            if let Err(e) = self.oauth.revoke(&token).await {
                warn!(error = %e, "failed to revoke token, removing it locally anyway");
            }
        }
        self.storage.clear()?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Unauthenticated) {
            return Ok(());
        }
        apply(&mut state, SessionEvent::SignedOut);
        info!("signed out");
        Ok(())
    }
}

/// Applies `event`, logging transitions the state machine refuses.
fn apply(state: &mut SessionState, event: SessionEvent) {
    if let Err(e) = state.apply(event) {
        warn!(error = %e, "ignored session event");
    }
}

impl Identity for GoogleIdentity {
    fn is_authenticated(&self) -> bool {
        self.state().is_ready()
    }

    fn principal(&self) -> Option<Principal> {
        self.state().principal().cloned()
    }

    fn access_token(&self) -> BoxFuture<'_, StoreResult<String>> {
        Box::pin(async move {
            if !self.is_authenticated() {
                return Err(StoreError::authentication("not signed in"));
            }
            self.valid_access_token().await
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(self.revoke_and_clear())
    }
}
