//! Authentication endpoints: login, registration, logout, profile.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::{ApiClient, ApiError, ApiResult};
use crate::credentials::{self, TokenSet};

/// Registration payload. Field names serialize to the backend's camelCase
/// wire format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub student_id: String,
    pub college: String,
    pub class_name: String,
}

/// Token payload returned by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl AuthResponse {
    /// Converts the response into a persistable token set, when the backend
    /// issued an access token.
    fn into_token_set(self) -> Option<TokenSet> {
        let access_token = self.access_token?;
        Some(TokenSet {
            access_token,
            refresh_token: self.refresh_token,
            user_info: self.user,
        })
    }
}

impl ApiClient {
    /// Logs in and persists the returned token set.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response carries no
    /// access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet> {
        let value = self
            .post(
                "/auth/login",
                json!({ "username": username, "password": password }),
            )
            .await?;
        let auth: AuthResponse = serde_json::from_value(value)
            .map_err(|e| ApiError::parse(format!("malformed login response: {e}")))?;
        let tokens = auth
            .into_token_set()
            .ok_or_else(|| ApiError::parse("login response missing accessToken"))?;
        credentials::save(self.home(), &tokens).context("persist credentials")?;
        Ok(tokens)
    }

    /// Registers a new account. Some deployments log the user straight in;
    /// when tokens come back they are persisted.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Option<TokenSet>> {
        let body = serde_json::to_value(request).context("serialize registration")?;
        let value = self.post("/auth/register", body).await?;
        let auth: AuthResponse = serde_json::from_value(value)
            .map_err(|e| ApiError::parse(format!("malformed registration response: {e}")))?;

        match auth.into_token_set() {
            Some(tokens) => {
                credentials::save(self.home(), &tokens).context("persist credentials")?;
                Ok(Some(tokens))
            }
            None => Ok(None),
        }
    }

    /// Logs out: best-effort server notification, then the local credentials
    /// are cleared regardless of the network outcome.
    ///
    /// # Errors
    /// Returns an error if the local credentials cannot be removed.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.post("/auth/logout", json!({})).await {
            warn!("logout request failed: {e}");
        }
        credentials::clear(self.home()).context("clear credentials")
    }

    /// Fetches the authenticated user's profile.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn me(&self) -> ApiResult<Value> {
        self.get("/auth/me").await
    }
}
