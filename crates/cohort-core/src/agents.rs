//! Agent registry cache and reply-target resolution.
//!
//! The registry holds a read-only cached copy of the backend's active
//! agents, refreshed on demand and cleared explicitly. Resolution decides
//! which agent an outgoing message is addressed to; it is advisory metadata
//! only — the backend stays authoritative for routing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ApiResult};
use crate::config::DefaultAgentConfig;
use crate::session::{Message, Sender};

/// First `@name` token: a run of non-whitespace, non-`@` characters.
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([^\s@]+)").expect("valid mention pattern"));

/// Review lifecycle of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

/// A lightweight reference to a backend-registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRef {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    /// Deployment-specific key/value settings (e.g. `original_id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HashMap<String, String>>,
}

fn default_enabled() -> bool {
    true
}

/// Where a message should be routed.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTarget {
    /// A resolved agent; its id travels with the request.
    Agent(AgentRef),
    /// No agents loaded at all — an advisory label with no id.
    Label(String),
}

impl AgentTarget {
    /// The agent id for the request body, when resolved.
    pub fn agent_id(&self) -> Option<i64> {
        match self {
            AgentTarget::Agent(agent) => Some(agent.id),
            AgentTarget::Label(_) => None,
        }
    }

    /// The display name for rendering the reply.
    pub fn display_name(&self) -> &str {
        match self {
            AgentTarget::Agent(agent) => &agent.display_name,
            AgentTarget::Label(label) => label,
        }
    }

    /// The message sender identity for the reply placeholder.
    pub fn sender(&self) -> Sender {
        match self {
            AgentTarget::Agent(agent) => Sender::Agent {
                id: Some(agent.id),
                name: agent.name.clone(),
                display_name: agent.display_name.clone(),
            },
            AgentTarget::Label(label) => Sender::Agent {
                id: None,
                name: label.clone(),
                display_name: label.clone(),
            },
        }
    }
}

/// Result of scanning a message for an `@name` mention.
#[derive(Debug)]
pub struct Mention<'a> {
    /// The mentioned agent, when the token matches a known one.
    pub agent: Option<&'a AgentRef>,
    /// Message text with the mention token stripped and trimmed.
    pub clean: String,
}

#[derive(Debug, Deserialize)]
struct ActiveAgentsResponse {
    #[serde(default)]
    agents: Vec<AgentRef>,
}

/// Explicit cache of the backend's active agents.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentRef>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cache with the backend's current active agents.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response is malformed.
    pub async fn refresh(&mut self, api: &ApiClient) -> ApiResult<()> {
        let value = api.get("/agents/active").await?;
        let parsed: ActiveAgentsResponse = serde_json::from_value(value)
            .map_err(|e| ApiError::parse(format!("malformed agents response: {e}")))?;
        self.agents = parsed.agents;
        Ok(())
    }

    /// Drops the cached agents.
    pub fn clear(&mut self) {
        self.agents.clear();
    }

    pub fn agents(&self) -> &[AgentRef] {
        &self.agents
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn by_id(&self, id: i64) -> Option<&AgentRef> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Looks up an agent by display name or internal name.
    pub fn by_name(&self, name: &str) -> Option<&AgentRef> {
        self.agents
            .iter()
            .find(|a| a.display_name == name || a.name == name)
    }

    /// Scans for the first `@name` token. The token is stripped from the
    /// clean content even when it matches no known agent.
    pub fn parse_mention(&self, content: &str) -> Mention<'_> {
        if let Some(caps) = MENTION_RE.captures(content) {
            let token = caps.get(1).map_or("", |m| m.as_str());
            Mention {
                agent: self.by_name(token),
                clean: MENTION_RE.replace(content, "").trim().to_string(),
            }
        } else {
            Mention {
                agent: None,
                clean: content.trim().to_string(),
            }
        }
    }

    /// Picks the agent that should reply to `content`.
    ///
    /// Resolution order: explicit mention; stickiness (the preceding
    /// non-user message carried a resolvable mention); the configured
    /// default agent; the first available agent; a bare label when nothing
    /// is loaded.
    pub fn select_reply_target(
        &self,
        content: &str,
        last_message: Option<&Message>,
        default_agent: &DefaultAgentConfig,
    ) -> AgentTarget {
        if let Some(agent) = self.parse_mention(content).agent {
            return AgentTarget::Agent(agent.clone());
        }

        if let Some(last) = last_message
            && !matches!(last.sender, Sender::User)
            && let Some(agent) = self.parse_mention(&last.content).agent
        {
            return AgentTarget::Agent(agent.clone());
        }

        if let Some(agent) = self.default_agent(default_agent) {
            return AgentTarget::Agent(agent.clone());
        }

        if let Some(agent) = self.agents.first() {
            return AgentTarget::Agent(agent.clone());
        }

        AgentTarget::Label(default_agent.display_name.clone())
    }

    /// Resolves the configured default agent: internal name, then display
    /// name (exact or substring), then case-insensitive internal-name
    /// substring, then the configured external identifier.
    fn default_agent(&self, default_agent: &DefaultAgentConfig) -> Option<&AgentRef> {
        let lowered = default_agent.name.to_lowercase();
        self.agents
            .iter()
            .find(|a| {
                a.name == default_agent.name
                    || a.display_name == default_agent.display_name
                    || a.display_name.contains(&default_agent.display_name)
                    || a.name.to_lowercase().contains(&lowered)
            })
            .or_else(|| {
                self.agents.iter().find(|a| {
                    a.config
                        .as_ref()
                        .is_some_and(|c| c.get("original_id") == Some(&default_agent.external_id))
                })
            })
    }
}
