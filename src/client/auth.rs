use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config;
use crate::error::PortalError;
use crate::session::{PortalRole, PortalSession};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    portal_id: &'a str,
    password: &'a str,
    role: PortalRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token swap returned by the refresh endpoint; the principal snapshot is
/// never re-sent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Thin wrappers over the portal server's auth endpoint contract:
///
/// - `POST /portal/auth/login {portalId, password, role}`
/// - `POST /portal/auth/refresh {refreshToken}`
/// - `GET /portal/auth/info` (bearer)
/// - `POST /portal/auth/logout` (bearer, best-effort)
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl AuthEndpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(config::config().api.request_timeout_secs),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config() -> Self {
        Self::new(config::config().api.base_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Exchange credentials for a full session. Non-2xx is a credentials
    /// failure carrying the server-supplied message when there is one.
    pub async fn login(
        &self,
        portal_id: &str,
        password: &str,
        role: PortalRole,
    ) -> Result<PortalSession, PortalError> {
        let res = self
            .http
            .post(self.url("/portal/auth/login"))
            .timeout(self.timeout)
            .json(&LoginRequest { portal_id, password, role })
            .send()
            .await?;

        if res.status().is_success() {
            res.json::<PortalSession>()
                .await
                .map_err(|e| PortalError::Network(format!("invalid login response: {}", e)))
        } else {
            Err(PortalError::Credentials(error_message(res, "Login failed").await))
        }
    }

    /// Exchange the refresh token for a new token pair. Non-2xx means the
    /// refresh token is dead.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, PortalError> {
        let res = self
            .http
            .post(self.url("/portal/auth/refresh"))
            .timeout(self.timeout)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if res.status().is_success() {
            res.json::<RefreshResponse>()
                .await
                .map_err(|e| PortalError::Network(format!("invalid refresh response: {}", e)))
        } else {
            Err(PortalError::SessionExpired)
        }
    }

    /// Liveness probe for an access token. 2xx means the token is live;
    /// anything else surfaces as an API error for the caller to interpret.
    pub async fn info(&self, access_token: &str) -> Result<Value, PortalError> {
        let res = self
            .http
            .get(self.url("/portal/auth/info"))
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            parse_body(res).await
        } else {
            let message = error_message(res, "Token rejected").await;
            Err(PortalError::Api { status: status.as_u16(), message })
        }
    }

    /// Ask the server to invalidate the refresh token. The caller ignores
    /// the outcome beyond logging.
    pub async fn logout(&self, access_token: &str) -> Result<(), PortalError> {
        let res = self
            .http
            .post(self.url("/portal/auth/logout"))
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = error_message(res, "Logout rejected").await;
            Err(PortalError::Api { status: status.as_u16(), message })
        }
    }
}

/// Parse a 2xx body as JSON, tolerating empty responses.
pub(crate) async fn parse_body(res: reqwest::Response) -> Result<Value, PortalError> {
    let text = res.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| PortalError::Network(format!("invalid response body: {}", e)))
}

/// Pull the server's `{"error": …}` message out of a failure response,
/// falling back to a generic one.
pub(crate) async fn error_message(res: reqwest::Response, default: &str) -> String {
    match res.json::<ErrorBody>().await {
        Ok(ErrorBody { error: Some(message) }) if !message.is_empty() => message,
        _ => default.to_string(),
    }
}
