//! The saved Google session: OAuth tokens plus the user they belong to.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use loanbook_core::Principal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Access tokens are treated as expired this long before Google says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes granted at sign-in.
    pub scopes: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

fn expiry_from(expires_in_secs: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in_secs
        .map(|secs| Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS))
}

impl TokenInfo {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expiry_from(expires_in_secs),
            scopes,
            last_refresh: Utc::now(),
        }
    }

    /// Returns true once the access token is expired or about to be.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Replaces the access token after a refresh. Google may rotate the
    /// refresh token too.
    pub fn refreshed(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) {
        self.access_token = access_token.into();
        self.expires_at = expiry_from(expires_in_secs);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.last_refresh = Utc::now();
    }
}

/// What is written to the session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    pub tokens: TokenInfo,
    #[serde(default)]
    pub principal: Option<Principal>,
}

/// The session file, cached in memory.
///
/// Written atomically through a temporary file and readable only by the
/// owner on Unix.
#[derive(Debug)]
pub struct SessionStorage {
    path: PathBuf,
    session: RwLock<Option<SavedSession>>,
}

impl SessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session: RwLock::new(None),
        }
    }

    /// Loads the session file. Returns `Ok(false)` if there is none.
    pub fn load(&self) -> StoreResult<bool> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no saved session");
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            StoreError::authentication(format!("failed to read session file: {}", e))
                .with_source(e)
        })?;
        let session: SavedSession = serde_json::from_str(&content).map_err(|e| {
            StoreError::authentication(format!("failed to parse session file: {}", e))
                .with_source(e)
        })?;

        info!(path = %self.path.display(), "restored saved session");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(true)
    }

    fn save(&self, session: &SavedSession) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::configuration(format!("failed to create session directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::internal(format!("failed to serialize session: {}", e)))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), "saved session");
        Ok(())
    }

    pub fn get(&self) -> Option<SavedSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn tokens(&self) -> Option<TokenInfo> {
        self.get().map(|s| s.tokens)
    }

    pub fn principal(&self) -> Option<Principal> {
        self.get().and_then(|s| s.principal)
    }

    /// Replaces the session and writes it out.
    pub fn set(&self, session: SavedSession) -> StoreResult<()> {
        self.save(&session)?;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Records a refreshed access token.
    pub fn update_tokens(
        &self,
        access_token: &str,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) -> StoreResult<TokenInfo> {
        let mut session = self
            .get()
            .ok_or_else(|| StoreError::authentication("not signed in"))?;
        session
            .tokens
            .refreshed(access_token, expires_in_secs, refresh_token);
        let tokens = session.tokens.clone();
        self.set(session)?;
        Ok(tokens)
    }

    /// Forgets the session in memory and on disk.
    pub fn clear(&self) -> StoreResult<()> {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "removed saved session");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when there is no session or it lacks one of `scopes`.
    pub fn needs_reauth(&self, scopes: &[String]) -> bool {
        self.tokens().is_none_or(|t| !t.has_scopes(scopes))
    }
}
