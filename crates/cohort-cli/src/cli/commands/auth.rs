//! Auth command handlers.

use anyhow::{Context, Result};
use cohort_core::api::{ApiClient, RegisterRequest};
use cohort_core::config::{self, Config};
use serde_json::Value;

fn client(config: &Config) -> Result<ApiClient> {
    ApiClient::new(config, config::paths::cohort_home()).context("build API client")
}

pub async fn login(config: &Config, username: &str, password: &str) -> Result<()> {
    let api = client(config)?;
    let tokens = api
        .login(username, password)
        .await
        .context("login failed")?;

    let display = tokens
        .user_info
        .as_ref()
        .and_then(|u| u.get("username"))
        .and_then(Value::as_str)
        .unwrap_or(username);
    println!("Logged in as {display}");
    Ok(())
}

pub async fn register(config: &Config, request: RegisterRequest) -> Result<()> {
    let api = client(config)?;
    let username = request.username.clone();
    let tokens = api.register(&request).await.context("registration failed")?;

    if tokens.is_some() {
        println!("Registered and logged in as {username}");
    } else {
        println!("Registered {username}; run `cohort login` once the account is approved");
    }
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let api = client(config)?;
    api.logout().await.context("logout failed")?;
    println!("Logged out");
    Ok(())
}
