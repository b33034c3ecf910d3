//! Session persistence: maps session ids to ordered message histories.
//!
//! The whole store lives in a single `sessions.json` (active pointer +
//! id → message array). Session bodies are kept as raw JSON values and
//! decoded per key, so one corrupt session cannot block access to the
//! others. Writes are whole-file and last-writer-wins across concurrent
//! processes; that race is accepted, not coordinated.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::chat::ChatRecord;

/// Who produced a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sender {
    User,
    System,
    Agent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        name: String,
        display_name: String,
    },
}

/// A single chat message. `content` grows incrementally while a reply
/// streams; the in-flight placeholder is marked with `is_typing` and
/// replaced in place by id, never duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    /// Wall-clock display time, `HH:MM`.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
}

impl Message {
    /// Creates a user message stamped with the current time.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: Sender::User,
            content: content.into(),
            timestamp: timestamp_now(),
            is_typing: None,
        }
    }

    /// Creates a system notice stamped with the current time.
    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: Sender::System,
            content: content.into(),
            timestamp: timestamp_now(),
            is_typing: None,
        }
    }

    /// Creates the empty in-flight placeholder for a streaming reply.
    pub fn placeholder(id: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: id.into(),
            sender,
            content: String::new(),
            timestamp: timestamp_now(),
            is_typing: Some(true),
        }
    }
}

/// Current wall-clock time in the display format.
pub(crate) fn timestamp_now() -> String {
    Local::now().format("%H:%M").to_string()
}

/// On-disk representation of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSessions {
    #[serde(default)]
    active: String,
    #[serde(default)]
    sessions: BTreeMap<String, Value>,
}

/// The session store: active pointer plus id → message history.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    active: String,
    sessions: BTreeMap<String, Value>,
}

impl SessionStore {
    /// Loads the store, creating a fresh session when the file is missing or
    /// the active pointer is unset. A corrupt top-level file starts fresh
    /// (logged); corruption scoped to a single session is isolated at read
    /// time instead.
    pub fn load(path: PathBuf) -> Self {
        let persisted = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<PersistedSessions>(&contents).unwrap_or_else(|e| {
                warn!("corrupt session store at {}, starting fresh: {e}", path.display());
                PersistedSessions::default()
            }),
            Err(_) => PersistedSessions::default(),
        };

        let mut store = Self {
            path,
            active: persisted.active,
            sessions: persisted.sessions,
        };
        if store.active.is_empty() {
            store.create_session();
        } else if !store.sessions.contains_key(&store.active) {
            store
                .sessions
                .insert(store.active.clone(), Value::Array(Vec::new()));
        }
        store
    }

    /// The active session id.
    pub fn active(&self) -> &str {
        &self.active
    }

    /// All known session ids.
    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Decodes the message history for a session. Unseen ids read as empty;
    /// a corrupt entry is logged and read as empty without touching other
    /// sessions.
    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        let Some(raw) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        match serde_json::from_value(raw.clone()) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("corrupt session '{session_id}', reading as empty: {e}");
                Vec::new()
            }
        }
    }

    /// Messages of the active session.
    pub fn active_messages(&self) -> Vec<Message> {
        self.messages(&self.active)
    }

    /// Creates a new session, makes it active, and returns its id.
    pub fn create_session(&mut self) -> String {
        let id = new_session_id();
        self.sessions.insert(id.clone(), Value::Array(Vec::new()));
        self.active = id.clone();
        id
    }

    /// Switches to `session_id` (created empty when unseen) and makes it
    /// active. The previous session's messages stay stored under its own id.
    pub fn switch_session(&mut self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        self.active = session_id.to_string();
    }

    /// Appends a message, or — when a message with the same id already
    /// exists — replaces its content and typing flag in place. The message
    /// count never grows for a repeated id.
    pub fn append_message(&mut self, session_id: &str, message: Message) {
        let mut messages = self.messages(session_id);
        if let Some(existing) = messages.iter_mut().find(|m| m.id == message.id) {
            existing.content = message.content;
            existing.is_typing = message.is_typing;
        } else {
            messages.push(message);
        }
        self.put(session_id, &messages);
    }

    /// Merges server history into a session: records are ordered by creation
    /// time and upserted by id, so re-merging is idempotent and local
    /// messages unknown to the server keep their position at the tail.
    pub fn merge_history(&mut self, session_id: &str, records: &[ChatRecord]) {
        let mut ordered: Vec<&ChatRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        for record in ordered {
            self.append_message(session_id, record.to_message());
        }
    }

    /// Persists the store. Whole-file write; last-writer-wins.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let persisted = PersistedSessions {
            active: self.active.clone(),
            sessions: self.sessions.clone(),
        };
        let contents =
            serde_json::to_string_pretty(&persisted).context("Failed to serialize sessions")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        Ok(())
    }

    fn put(&mut self, session_id: &str, messages: &[Message]) {
        match serde_json::to_value(messages) {
            Ok(raw) => {
                self.sessions.insert(session_id.to_string(), raw);
            }
            Err(e) => warn!("failed to encode session '{session_id}': {e}"),
        }
    }
}

/// Time-based session identifier with a random suffix.
fn new_session_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("session_{millis}_{suffix}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_at(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::load(dir.path().join("sessions.json"))
    }

    #[test]
    fn fresh_store_creates_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        assert!(store.active().starts_with("session_"));
        assert!(store.active_messages().is_empty());
    }

    #[test]
    fn append_with_same_id_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let id = store.active().to_string();

        let mut placeholder = Message {
            id: "agent-1".to_string(),
            sender: Sender::System,
            content: String::new(),
            timestamp: "10:00".to_string(),
            is_typing: Some(true),
        };
        store.append_message(&id, placeholder.clone());
        placeholder.content = "Hello".to_string();
        placeholder.is_typing = None;
        store.append_message(&id, placeholder);

        let messages = store.messages(&id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].is_typing, None);
    }

    #[test]
    fn switch_roundtrip_restores_exact_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let a = store.active().to_string();
        store.append_message(&a, Message::user("u1", "first"));
        store.append_message(&a, Message::user("u2", "second"));
        let expected = store.messages(&a);
        store.save().unwrap();

        let b = store.create_session();
        store.append_message(&b, Message::user("u3", "other thread"));
        store.save().unwrap();

        // Reload from disk and switch back to A.
        let mut store = store_at(&dir);
        assert_eq!(store.active(), b);
        store.switch_session(&a);
        assert_eq!(store.messages(&a), expected);
    }

    #[test]
    fn corrupt_session_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(
            &path,
            json!({
                "active": "good",
                "sessions": {
                    "good": [{"id": "u1", "sender": {"kind": "user"}, "content": "hi", "timestamp": "10:00"}],
                    "bad": {"not": "an array"}
                }
            })
            .to_string(),
        )
        .unwrap();

        let store = SessionStore::load(path);
        assert_eq!(store.messages("good").len(), 1);
        assert!(store.messages("bad").is_empty());
        // The corrupt entry is preserved on disk until overwritten.
        assert_eq!(store.session_ids().count(), 2);
    }

    #[test]
    fn corrupt_top_level_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SessionStore::load(path);
        assert!(store.active().starts_with("session_"));
    }

    #[test]
    fn merge_history_sorts_and_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let id = store.active().to_string();

        let records: Vec<ChatRecord> = serde_json::from_value(json!([
            {"id": 2, "content": "second", "messageType": "AGENT",
             "agent": {"id": 3, "name": "tutor", "displayName": "Tutor"},
             "createdAt": "2026-03-02T09:31:00"},
            {"id": 1, "content": "first", "messageType": "USER",
             "createdAt": "2026-03-02T09:30:00"}
        ]))
        .unwrap();

        store.merge_history(&id, &records);
        let messages = store.messages(&id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");

        // Re-merging must not duplicate.
        store.merge_history(&id, &records);
        assert_eq!(store.messages(&id).len(), 2);
    }

    #[test]
    fn session_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let first = store.create_session();
        let second = store.create_session();
        assert_ne!(first, second);
    }
}
