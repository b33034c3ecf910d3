//! Credential storage for the authenticated transport.
//!
//! Stores the token set in `<home>/auth.json` with restricted permissions
//! (0600). Tokens are never logged in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Credential cache filename.
const AUTH_FILE: &str = "auth.json";

/// Stored bearer credentials plus the cached user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token (short-lived).
    pub access_token: String,
    /// The refresh token (long-lived), when the backend issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Cached user profile returned at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

/// Returns the path to the credential file under `home`.
pub fn auth_path(home: &Path) -> PathBuf {
    home.join(AUTH_FILE)
}

/// Loads the stored token set.
/// Returns `Ok(None)` when no credentials have been saved.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(home: &Path) -> Result<Option<TokenSet>> {
    let path = auth_path(home);
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read credentials from {}", path.display()))?;

    let tokens = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse credentials from {}", path.display()))?;
    Ok(Some(tokens))
}

/// Saves the token set with restricted permissions (0600).
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save(home: &Path, tokens: &TokenSet) -> Result<()> {
    let path = auth_path(home);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let contents = serde_json::to_string_pretty(tokens).context("Failed to serialize credentials")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    Ok(())
}

/// Removes the stored credentials. Idempotent.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn clear(home: &Path) -> Result<()> {
    let path = auth_path(home);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
