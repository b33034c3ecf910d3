//! Agent command handlers.

use anyhow::{Context, Result};
use cohort_core::agents::AgentRegistry;
use cohort_core::api::ApiClient;
use cohort_core::config::{self, Config};

pub async fn list(config: &Config) -> Result<()> {
    let api = ApiClient::new(config, config::paths::cohort_home()).context("build API client")?;

    let mut registry = AgentRegistry::new();
    registry.refresh(&api).await.context("fetch active agents")?;

    if registry.is_empty() {
        println!("No active agents.");
        return Ok(());
    }

    for agent in registry.agents() {
        let status = agent
            .status
            .map_or_else(|| "-".to_string(), |s| format!("{s:?}").to_uppercase());
        println!("@{}  {}  {}  {}", agent.display_name, agent.name, agent.id, status);
    }
    Ok(())
}
