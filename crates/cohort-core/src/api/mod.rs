//! Authenticated HTTP transport.
//!
//! Wraps every request with the stored bearer token, detects authentication
//! failures (status code or backend message heuristics), and recovers by
//! refreshing the token once before retrying the original request once.
//! Concurrent refreshes are collapsed into a single in-flight operation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::credentials::{self, TokenSet};

mod auth;
mod error;

pub use auth::{AuthResponse, RegisterRequest};
pub use error::{ApiError, ApiErrorKind, ApiResult};

pub(crate) use error::classify_transport_error;

/// Standard User-Agent header for cohort API requests.
pub const USER_AGENT: &str = concat!("cohort/", env!("CARGO_PKG_VERSION"));

/// Shared handle to an in-flight token refresh. The boolean is the refresh
/// outcome; token persistence happens inside the refresh itself.
type RefreshFuture = Shared<BoxFuture<'static, bool>>;

/// API client bound to a base URL and a credential home directory.
pub struct ApiClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) home: PathBuf,
    refresh_gate: Arc<Mutex<Option<RefreshFuture>>>,
}

impl ApiClient {
    /// Creates a client from the configuration, storing credentials under
    /// `home`.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be constructed.
    pub fn new(config: &Config, home: PathBuf) -> Result<Self> {
        let base_url = config.resolved_base_url()?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            timeout: config.timeout(),
            home,
            refresh_gate: Arc::new(Mutex::new(None)),
        })
    }

    /// The resolved API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The credential home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Issues a GET request.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get(&self, path: &str) -> ApiResult<Value> {
        self.request(Method::GET, path, None).await
    }

    /// Issues a POST request with a JSON body.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Issues a PUT request with a JSON body.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn put(&self, path: &str, body: Value) -> ApiResult<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// Issues a DELETE request.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn delete(&self, path: &str) -> ApiResult<Value> {
        self.request(Method::DELETE, path, None).await
    }

    /// Core request path: bearer header, auth-failure detection, and a single
    /// refresh-then-retry. The loop is bounded: at most two underlying
    /// attempts per logical request.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut retried = false;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .timeout(self.timeout)
                .header("content-type", "application/json");
            if let Some(token) = self.access_token() {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| classify_transport_error(&e))?;
            let status = response.status();
            let data = read_json_body(response).await?;

            if !status.is_success() {
                if is_authentication_error(status, &data) && !retried {
                    retried = true;
                    if self.refresh_access_token().await {
                        debug!("access token refreshed, retrying request");
                        continue;
                    }
                    return Err(ApiError::session_expired());
                }
                return Err(ApiError::http_status(status.as_u16(), &data));
            }

            return unwrap_envelope(data);
        }
    }

    /// Reads the current access token from the credential store.
    pub(crate) fn access_token(&self) -> Option<String> {
        credentials::load(&self.home)
            .ok()
            .flatten()
            .map(|t| t.access_token)
    }

    /// Refreshes the access token, collapsing concurrent callers onto one
    /// in-flight refresh. Returns true when a fresh token was persisted.
    ///
    /// The gate slot is cleared when the refresh settles, success or failure,
    /// so later callers initiate a fresh refresh.
    pub(crate) async fn refresh_access_token(&self) -> bool {
        let refresh = {
            let mut slot = self.refresh_gate.lock().unwrap();
            if let Some(pending) = slot.as_ref() {
                pending.clone()
            } else {
                let http = self.http.clone();
                let base_url = self.base_url.clone();
                let home = self.home.clone();
                let gate = Arc::clone(&self.refresh_gate);
                let fut: RefreshFuture = async move {
                    let ok = perform_refresh(&http, &base_url, &home).await;
                    *gate.lock().unwrap() = None;
                    ok
                }
                .boxed()
                .shared();
                *slot = Some(fut.clone());
                fut
            }
        };
        refresh.await
    }
}

/// Performs the actual `POST /auth/refresh` call.
///
/// On success the stored tokens are overwritten. A rejected refresh clears
/// the stored credentials; a transport failure leaves them untouched so a
/// later attempt can still succeed.
async fn perform_refresh(http: &reqwest::Client, base_url: &str, home: &Path) -> bool {
    let Some(tokens) = credentials::load(home).ok().flatten() else {
        debug!("no stored credentials, skipping token refresh");
        return false;
    };
    let Some(refresh_token) = tokens.refresh_token.clone() else {
        debug!("no refresh token available");
        return false;
    };

    let response = match http
        .post(format!("{base_url}/auth/refresh"))
        .header("content-type", "application/json")
        .json(&json!({ "refreshToken": refresh_token }))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("token refresh request failed: {e}");
            return false;
        }
    };

    if response.status().is_success() {
        let data = response.json::<Value>().await.unwrap_or(Value::Null);
        if let Some(access) = data.get("accessToken").and_then(Value::as_str) {
            let refreshed = TokenSet {
                access_token: access.to_string(),
                refresh_token: data
                    .get("refreshToken")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or(tokens.refresh_token),
                user_info: tokens.user_info,
            };
            match credentials::save(home, &refreshed) {
                Ok(()) => {
                    debug!("token refresh succeeded");
                    return true;
                }
                Err(e) => {
                    warn!("failed to persist refreshed tokens: {e:#}");
                    return false;
                }
            }
        }
    }

    warn!("token refresh rejected, clearing stored credentials");
    if let Err(e) = credentials::clear(home) {
        warn!("failed to clear credentials: {e:#}");
    }
    false
}

/// Decodes a response body as JSON; empty bodies decode to `null`.
async fn read_json_body(response: reqwest::Response) -> ApiResult<Value> {
    let text = response
        .text()
        .await
        .map_err(|e| classify_transport_error(&e))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ApiError::parse(format!("undecodable response body: {e}")))
}

/// Known backend phrases that mark a response as an authentication failure.
///
/// This free-text scan mirrors the platform's historical behavior and is
/// intentionally broad; see DESIGN.md.
const AUTH_FAILURE_PHRASES: &[&str] = &[
    "authentication",
    "token",
    "unauthorized",
    "身份验证",
    "已过期",
    "invalid token",
    "token expired",
    "无效的认证信息",
];

/// Upstream provider error phrase matched case-sensitively.
const PROVIDER_TOKEN_EXPIRED: &str = "Authentication Token已过期，请重新生成";

/// Decides whether a failed response is an authentication failure eligible
/// for refresh-and-retry.
pub(crate) fn is_authentication_error(status: StatusCode, body: &Value) -> bool {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return true;
    }

    let message = body
        .get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let lower = message.to_lowercase();
    if AUTH_FAILURE_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    if message.contains(PROVIDER_TOKEN_EXPIRED) {
        return true;
    }

    // Upstream provider error codes for expired/invalid credentials.
    matches!(body.get("code").and_then(Value::as_i64), Some(1001 | 1002))
}

/// Unwraps the backend's `{ success, data, message }` envelope. Bodies
/// without a boolean `success` field pass through unchanged.
fn unwrap_envelope(data: Value) -> ApiResult<Value> {
    match data.get("success").and_then(Value::as_bool) {
        Some(true) => {
            if let Some(inner) = data.get("data") {
                Ok(inner.clone())
            } else {
                Ok(data)
            }
        }
        Some(false) => {
            let message = data
                .get("message")
                .or_else(|| data.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("request rejected by backend")
                .to_string();
            Err(ApiError::new(ApiErrorKind::Api, message))
        }
        None => Ok(data),
    }
}
