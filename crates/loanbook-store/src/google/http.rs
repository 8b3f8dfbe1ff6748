//! Authorized JSON requests against Google APIs.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::Identity;

use super::identity::GoogleIdentity;

/// A `reqwest` client that attaches the current access token and maps HTTP
/// failures onto [`StoreError`].
///
/// A 401 drops the saved session so the next command asks the user to sign
/// in again.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    identity: Arc<GoogleIdentity>,
    backend: &'static str,
}

impl AuthorizedClient {
    pub fn new(
        identity: Arc<GoogleIdentity>,
        timeout: std::time::Duration,
        backend: &'static str,
    ) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            identity,
            backend,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> StoreResult<T> {
        self.json(Method::GET, url, None::<&()>).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> StoreResult<T> {
        self.json(Method::POST, url, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> StoreResult<T> {
        self.json(Method::PUT, url, Some(body)).await
    }

    /// Returns `Ok(None)` on 404 instead of an error.
    pub async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> StoreResult<Option<T>> {
        match self.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == crate::error::StoreErrorCode::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sends a request built on the underlying client, e.g. a multipart upload.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    async fn json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> StoreResult<T> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.send(request).await?;
        let text = response.text().await.map_err(|e| {
            StoreError::network(format!("failed to read response: {}", e)).with_backend(self.backend)
        })?;
        // Some endpoints answer with an empty body.
        let text = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str(text).map_err(|e| {
            StoreError::invalid_response(format!("failed to parse response: {}", e))
                .with_backend(self.backend)
        })
    }

    /// Authorizes and sends `request`, turning non-success statuses into
    /// errors.
    pub async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let token = self
            .identity
            .access_token()
            .await
            .map_err(|e| e.with_backend(self.backend))?;
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timed out".to_string()
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            StoreError::network(message).with_backend(self.backend)
        })?;

        let status = response.status();
        debug!(backend = self.backend, url = %response.url(), %status, "google api response");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await.unwrap_or_default();
        let error = status_error(status, &body, retry_after.as_deref());
        if error.is_authentication() {
            self.identity.reject();
        }
        Err(error.with_backend(self.backend))
    }
}

/// Maps an unsuccessful status to the matching error kind.
fn status_error(status: StatusCode, body: &str, retry_after: Option<&str>) -> StoreError {
    let detail = api_message(body).unwrap_or_else(|| body.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED => {
            StoreError::authentication("access token expired or was revoked")
        }
        StatusCode::FORBIDDEN => StoreError::authorization(format!("access denied: {}", detail)),
        StatusCode::NOT_FOUND => StoreError::not_found(detail),
        StatusCode::BAD_REQUEST => StoreError::bad_request(detail),
        StatusCode::TOO_MANY_REQUESTS => {
            let hint = retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default();
            warn!("google api rate limit hit");
            StoreError::rate_limited(format!("rate limit exceeded{}", hint))
        }
        s if s.is_server_error() => StoreError::server(format!("api error ({}): {}", s, detail)),
        s => StoreError::invalid_response(format!("unexpected status {}: {}", s, detail)),
    }
}

/// Pulls `error.message` out of a Google error body.
fn api_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorCode;

    #[test]
    fn statuses_map_to_codes() {
        let cases = [
            (StatusCode::UNAUTHORIZED, StoreErrorCode::AuthenticationFailed),
            (StatusCode::FORBIDDEN, StoreErrorCode::AuthorizationFailed),
            (StatusCode::NOT_FOUND, StoreErrorCode::NotFound),
            (StatusCode::BAD_REQUEST, StoreErrorCode::BadRequest),
            (StatusCode::TOO_MANY_REQUESTS, StoreErrorCode::RateLimited),
            (StatusCode::BAD_GATEWAY, StoreErrorCode::ServerError),
            (StatusCode::CONFLICT, StoreErrorCode::InvalidResponse),
        ];
        for (status, code) in cases {
            assert_eq!(status_error(status, "", None).code(), code, "{}", status);
        }
    }

    #[test]
    fn google_error_message_is_extracted() {
        let body = r#"{"error":{"code":400,"message":"Unable to parse range: Loans!A1","status":"INVALID_ARGUMENT"}}"#;
        let err = status_error(StatusCode::BAD_REQUEST, body, None);
        assert_eq!(err.message(), "Unable to parse range: Loans!A1");
    }

    #[test]
    fn retry_after_is_reported() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "", Some("30"));
        assert!(err.message().contains("retry after 30 seconds"));
    }
}
