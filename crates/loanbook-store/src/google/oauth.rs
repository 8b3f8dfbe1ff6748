//! OAuth 2.0 authorization code flow with PKCE and a loopback redirect.
//!
//! The browser is sent to Google's consent page; Google redirects back to a
//! one-shot listener on `127.0.0.1`, and the code it carries is exchanged for
//! tokens together with the PKCE verifier.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{StoreError, StoreResult};

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

const CODE_VERIFIER_BYTES: usize = 32;

/// How long the browser has to come back.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
<html><body><h1>Signed in to loanbook</h1>\
<p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
<html><body><h1>Sign-in failed</h1>\
<p>You can close this window.</p></body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// A refreshed access token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
}

#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(credentials: OAuthCredentials, timeout: Duration) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                StoreError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })?;
        Ok(Self { credentials, http })
    }

    /// Runs the browser sign-in and returns the granted tokens.
    pub async fn authorize(
        &self,
        scopes: &[String],
        port_range: (u16, u16),
    ) -> StoreResult<TokenInfo> {
        let pkce = PkceFlow::new();
        let (listener, port) = bind_loopback(port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.auth_url(&self.credentials.client_id, &redirect_uri, scopes)?;

        info!("opening browser for Google sign-in");
        debug!(url = %auth_url, "authorization url");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nOpen this URL in your browser to sign in:\n\n{}\n", auth_url);
        }

        let callback = tokio::time::timeout(CALLBACK_TIMEOUT, accept_callback(&listener))
            .await
            .map_err(|_| StoreError::authentication("timed out waiting for browser sign-in"))??;

        if callback.state != pkce.state {
            return Err(StoreError::authentication(
                "sign-in state mismatch, refusing the authorization code",
            ));
        }

        info!("received authorization code");
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", callback.code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let response = self.token_request(&params, "token exchange").await?;
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            scopes.to_vec(),
        ))
    }

    pub async fn refresh(&self, refresh_token: &str) -> StoreResult<RefreshedToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.token_request(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok(RefreshedToken {
            access_token: response.access_token,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
        })
    }

    /// Asks Google to invalidate `token`. Revoking a refresh token also
    /// revokes its access tokens.
    pub async fn revoke(&self, token: &str) -> StoreResult<()> {
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("revoke request failed: {}", e)))?;
        let status = response.status();
        // 400 means the token was already invalid.
        if status.is_success() || status == reqwest::StatusCode::BAD_REQUEST {
            Ok(())
        } else {
            Err(StoreError::server(format!("token revocation failed ({})", status)))
        }
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> StoreResult<TokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| StoreError::network(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::network(format!("failed to read {} response: {}", what, e)))?;

        if !status.is_success() {
            return Err(StoreError::authentication(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            StoreError::invalid_response(format!("invalid {} response: {}", what, e))
        })
    }
}

async fn bind_loopback(port_range: (u16, u16)) -> StoreResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            debug!(port, "bound loopback listener");
            return Ok((listener, port));
        }
    }
    Err(StoreError::configuration(format!(
        "no free port in {}-{} for the sign-in redirect",
        port_range.0, port_range.1
    )))
}

#[derive(Debug, PartialEq, Eq)]
struct Callback {
    code: String,
    state: String,
}

/// Serves connections until one carries the OAuth redirect.
async fn accept_callback(listener: &TcpListener) -> StoreResult<Callback> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "sign-in redirect connection");
        if let Some(result) = handle_connection(stream).await {
            return result;
        }
    }
}

async fn handle_connection(mut stream: TcpStream) -> Option<StoreResult<Callback>> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        reader.read_line(&mut request_line).await.ok()?;
    }

    let result = parse_redirect(&request_line)?;
    let page = if result.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
    let _ = stream.write_all(page.as_bytes()).await;
    let _ = stream.shutdown().await;
    Some(result)
}

/// Reads `GET /callback?code=..&state=.. HTTP/1.1`.
///
/// Returns `None` for requests that are not the redirect, such as the
/// browser asking for a favicon.
fn parse_redirect(request_line: &str) -> Option<StoreResult<Callback>> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let url = Url::parse("http://127.0.0.1").ok()?.join(target).ok()?;
    if url.path() != "/callback" {
        return None;
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Some(Err(StoreError::authentication(format!(
                    "sign-in was declined: {}",
                    value
                ))));
            }
            _ => {}
        }
    }

    Some(match code {
        Some(code) => Ok(Callback {
            code,
            state: state.unwrap_or_default(),
        }),
        None => Err(StoreError::authentication(
            "sign-in redirect carried no authorization code",
        )),
    })
}

/// Verifier, challenge and anti-forgery state for one sign-in (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_BYTES);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    /// Google's consent page URL, asking for a refresh token.
    pub fn auth_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> StoreResult<Url> {
        let scope = scopes.join(" ");
        Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("code_challenge", self.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", self.state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| StoreError::internal(format!("invalid authorization url: {}", e)))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
