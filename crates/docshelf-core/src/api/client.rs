//! REST client for the docshelf service API.
//!
//! Thin, policy-free transport: bearer-token headers, JSON bodies, and
//! rate-limit backoff. Session policy lives in the `auth` module; the one
//! coupling point is the optional event bus hook, which turns a 401 on an
//! authenticated data request into an `Unauthorized` session signal the
//! way the session core expects.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::refresh::{RefreshedTokens, TokenRefresher};
use crate::auth::store::Credential;
use crate::auth::{EventBus, SessionEventKind};
use crate::models::{DocumentSummary, Profile, WorkspaceId, WorkspaceSnapshot};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// OCR result payloads can be large; 30s fails fast without cutting off
/// slow-but-healthy responses.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting, doubled per
/// retry.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: Profile,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// API client for the docshelf service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    events: Option<Arc<EventBus>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            events: None,
        })
    }

    /// Set the bearer token for authenticated requests.
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a client with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
            events: self.events.clone(),
        }
    }

    /// Attach the session bus so a 401 on an authenticated data request
    /// surfaces as an `Unauthorized` session signal.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Exchange credentials for a token pair and the user's profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<(Credential, Profile)> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .context("Failed to send login request")?;

        let response = Self::check_response(response).await?;
        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        Ok((
            Credential {
                access_token: login.access_token,
                refresh_token: login.refresh_token,
            },
            login.user,
        ))
    }

    // ===== Workspace data =====

    pub async fn fetch_workspaces(&self) -> Result<Vec<WorkspaceSnapshot>> {
        self.get(&format!("{}/workspaces", self.base_url)).await
    }

    pub async fn fetch_workspace(&self, id: &WorkspaceId) -> Result<WorkspaceSnapshot> {
        self.get(&format!("{}/workspaces/{}", self.base_url, id))
            .await
    }

    pub async fn fetch_documents(&self, id: &WorkspaceId) -> Result<Vec<DocumentSummary>> {
        self.get(&format!("{}/workspaces/{}/documents", self.base_url, id))
            .await
    }

    // ===== Plumbing =====

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if a response is successful, returning an error with body if
    /// not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    fn signal_unauthorized(&self) {
        if let Some(events) = &self.events {
            events.emit(
                SessionEventKind::Unauthorized,
                Some("request rejected with 401".to_string()),
            );
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json()
                    .await
                    .with_context(|| format!("Failed to parse JSON response from {}", url));
            }
            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited.into());
                }
                warn!(url, retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);
            if error.is_unauthorized() {
                debug!(url, "Authenticated request rejected; signalling session");
                self.signal_unauthorized();
            }
            return Err(error.into());
        }
    }
}

#[async_trait]
impl TokenRefresher for ApiClient {
    /// POST /auth/refresh. Does not signal the bus itself: the refresh
    /// scheduler owns the failure semantics for this endpoint.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        let url = format!("{}/auth/refresh", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .context("Failed to parse token refresh response")
    }
}
