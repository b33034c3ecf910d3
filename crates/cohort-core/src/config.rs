//! Configuration management for cohort.
//!
//! Loads configuration from ${COHORT_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API root, e.g. `http://localhost:8080/api`.
    pub base_url: String,
    /// Per-request timeout for JSON endpoints (streaming responses are exempt).
    pub timeout_secs: u64,
    /// Fallback agent used when a message carries no mention and the
    /// conversation has no sticky target.
    pub default_agent: DefaultAgentConfig,
}

/// Identity of the platform's configured default agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultAgentConfig {
    /// Internal agent name.
    pub name: String,
    /// Display name shown in chat (also the advisory label when no agents
    /// are loaded at all).
    pub display_name: String,
    /// External identifier matched against an agent's `original_id` config
    /// entry.
    pub external_id: String,
}

impl Default for DefaultAgentConfig {
    fn default() -> Self {
        Self {
            name: "lingxi".to_string(),
            display_name: "灵犀".to_string(),
            external_id: "6867fda14c78b04e5ad1b603".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_BASE_URL.to_string(),
            timeout_secs: Config::DEFAULT_TIMEOUT_SECS,
            default_agent: DefaultAgentConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8080/api";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Loads the configuration from the default location.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads the configuration from a specific path.
    /// Returns defaults when the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Writes a default config file at the given path (no overwrite).
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn init_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(true)
    }

    /// Resolves the API base URL with precedence: env > config.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is not well-formed.
    pub fn resolved_base_url(&self) -> Result<String> {
        if let Ok(env_url) = std::env::var("COHORT_API_URL") {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                validate_url(trimmed)?;
                return Ok(trimmed.trim_end_matches('/').to_string());
            }
        }

        let trimmed = self.base_url.trim();
        validate_url(trimmed)?;
        Ok(trimmed.trim_end_matches('/').to_string())
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Validates that a URL is well-formed.
fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid API base URL: {url}"))?;
    Ok(())
}

pub mod paths {
    //! Path resolution for cohort configuration and data files.
    //!
    //! COHORT_HOME resolution order:
    //! 1. COHORT_HOME environment variable (if set)
    //! 2. ~/.config/cohort (default)

    use std::path::PathBuf;

    /// Returns the cohort home directory.
    ///
    /// Checks COHORT_HOME env var first, falls back to ~/.config/cohort
    pub fn cohort_home() -> PathBuf {
        if let Ok(home) = std::env::var("COHORT_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("cohort"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        cohort_home().join("config.toml")
    }

    /// Returns the path to the stored credentials file.
    pub fn auth_path() -> PathBuf {
        cohort_home().join("auth.json")
    }

    /// Returns the path to the persisted sessions file.
    pub fn sessions_path() -> PathBuf {
        cohort_home().join("sessions.json")
    }
}
