pub mod auth;

pub use auth::AuthEndpoints;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::config;
use crate::error::PortalError;
use crate::session::SessionManager;

/// Retry policy for a single outbound request: a 401 is answered with
/// exactly one refresh-and-resubmit, never more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    FirstAttempt,
    Retried,
}

/// Authenticated portal API client.
///
/// Attaches the current access token to every request. On a 401 it triggers
/// one session refresh through the manager and resubmits the request once
/// with the new token; if the refresh fails, or the retry comes back 401
/// again, the failure is surfaced to the caller.
pub struct PortalClient {
    manager: Arc<SessionManager>,
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PortalClient {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self::with_base_url(manager, config::config().api.base_url.clone())
    }

    pub fn with_base_url(manager: Arc<SessionManager>, base_url: impl Into<String>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(config::config().api.request_timeout_secs),
        }
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, PortalError> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value, PortalError> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Value, PortalError> {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, PortalError> {
        self.request(Method::DELETE, endpoint, None).await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, PortalError> {
        let mut retry = RetryState::FirstAttempt;

        loop {
            let token = self
                .manager
                .access_token()
                .await
                .ok_or(PortalError::NotAuthenticated)?;

            let mut req = self
                .http
                .request(method.clone(), self.url(endpoint))
                .timeout(self.timeout)
                .bearer_auth(&token);
            if let Some(body) = &body {
                req = req.json(body);
            }

            let res = req.send().await?;
            let status = res.status();

            if status == StatusCode::UNAUTHORIZED && retry == RetryState::FirstAttempt {
                retry = RetryState::Retried;
                tracing::debug!("401 from {} {}, refreshing and retrying once", method, endpoint);
                self.manager.refresh_session().await?;
                continue;
            }

            if status.is_success() {
                return auth::parse_body(res).await;
            }

            let message = auth::error_message(res, "Request failed").await;
            return Err(PortalError::Api { status: status.as_u16(), message });
        }
    }
}
