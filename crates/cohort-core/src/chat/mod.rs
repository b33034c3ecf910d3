//! Chat endpoints: streaming send and history retrieval.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{ApiClient, ApiError, ApiResult, classify_transport_error};
use crate::session::{Message, Sender, timestamp_now};

pub mod sse;

pub use sse::{ChatStreamEvent, DONE_SENTINEL, SseParser};

/// Boxed stream of decoded chat events.
pub type ChatEventStream = BoxStream<'static, ApiResult<ChatStreamEvent>>;

/// Agent summary embedded in a history record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A single server-side history record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    /// Backend record id; numeric on the wire but treated as opaque.
    pub id: Value,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub agent: Option<AgentSummary>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ChatRecord {
    /// Normalizes the record id to a string key.
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Converts the record into a local message. Malformed timestamps fall
    /// back to the current time rather than failing the load.
    pub fn to_message(&self) -> Message {
        let timestamp = self
            .created_at
            .as_deref()
            .and_then(parse_created_at)
            .map(|dt| dt.format("%H:%M").to_string())
            .unwrap_or_else(timestamp_now);

        let sender = if self.message_type.as_deref() == Some("USER") {
            Sender::User
        } else if let Some(agent) = &self.agent {
            let name = agent.name.clone().unwrap_or_else(|| "assistant".to_string());
            let display_name = agent.display_name.clone().unwrap_or_else(|| name.clone());
            Sender::Agent {
                id: agent.id,
                name,
                display_name,
            }
        } else {
            Sender::Agent {
                id: None,
                name: "assistant".to_string(),
                display_name: "assistant".to_string(),
            }
        };

        Message {
            id: self.id_string(),
            sender,
            content: self.content.clone(),
            timestamp,
            is_typing: None,
        }
    }
}

/// One page of server history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub history: Vec<ChatRecord>,
    #[serde(default)]
    pub total: u64,
}

impl ApiClient {
    /// Fetches the server-side history for a session.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn chat_history(&self, session_id: &str) -> ApiResult<HistoryPage> {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("sessionId", session_id)
            .finish();
        let value = self.get(&format!("/chat/history?{query}")).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::parse(format!("malformed history response: {e}")))
    }

    /// Sends a message and returns the decoded SSE reply stream.
    ///
    /// Only the *initial* request participates in refresh-and-retry; once a
    /// stream has started delivering, partial content cannot be safely
    /// replayed, so stream failures are surfaced without retry.
    ///
    /// # Errors
    /// Returns an error if no credentials are stored or the initial request
    /// fails.
    pub async fn send_message_stream(
        &self,
        session_id: &str,
        content: &str,
        agent_id: Option<i64>,
    ) -> ApiResult<ChatEventStream> {
        let url = format!("{}/chat/send/stream", self.base_url);
        let body = json!({
            "sessionId": session_id,
            "content": content,
            "agentId": agent_id,
        });
        let mut retried = false;

        loop {
            let Some(token) = self.access_token() else {
                return Err(ApiError::session_expired());
            };

            // No read timeout here: the reply streams for as long as the
            // agent keeps producing tokens.
            let response = self
                .http
                .post(&url)
                .header("accept", "text/event-stream")
                .header("cache-control", "no-cache")
                .header("content-type", "application/json")
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| classify_transport_error(&e))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let data: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                if crate::api::is_authentication_error(status, &data) && !retried {
                    retried = true;
                    if self.refresh_access_token().await {
                        continue;
                    }
                    return Err(ApiError::session_expired());
                }
                return Err(ApiError::http_status(status.as_u16(), &data));
            }

            return Ok(SseParser::new(response.bytes_stream()).boxed());
        }
    }
}

/// Parses a backend timestamp; accepts RFC 3339 and the zone-less variant.
fn parse_created_at(s: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Local.from_local_datetime(&naive).single();
    }
    None
}
