//! SSE and auth fixture helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;

use serde_json::json;
use wiremock::ResponseTemplate;

/// Builds a streamed chat reply: one `chunk` frame per fragment, an
/// `agent_complete` record, then the `[DONE]` sentinel.
pub fn chat_sse(fragments: &[&str]) -> String {
    let mut body = String::new();
    body.push_str("event: user_message\ndata: {\"message\":\"received\"}\n\n");
    body.push_str("event: agent_start\ndata: {\"agentId\":1}\n\n");
    for fragment in fragments {
        body.push_str(&format!(
            "event: chunk\ndata: {{\"chunk\":\"{}\"}}\n\n",
            escape_json(fragment)
        ));
    }
    let full: String = fragments.concat();
    body.push_str(&format!(
        "event: agent_complete\ndata: {{\"chatHistory\":{{\"id\":99,\"content\":\"{}\"}}}}\n\n",
        escape_json(&full)
    ));
    body.push_str("data: [DONE]\n\n");
    body
}

/// Wraps an SSE body string in a ResponseTemplate.
pub fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

/// Auth token JSON response.
pub fn tokens_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "accessToken": access,
        "refreshToken": refresh,
        "user": {"username": "alice", "role": "STUDENT"}
    }))
}

/// Active agents listing with a default agent and a mentionable tutor.
pub fn agents_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "agents": [
            {"id": 1, "name": "lingxi", "displayName": "灵犀", "enabled": true, "status": "APPROVED"},
            {"id": 2, "name": "math-tutor", "displayName": "Tutor", "enabled": true, "status": "APPROVED"}
        ]
    }))
}

/// Empty server-side history.
pub fn empty_history_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"history": [], "total": 0}))
}

/// Pre-seeds stored credentials under the test home directory.
pub fn seed_tokens(home: &Path, access: &str, refresh: &str) {
    std::fs::create_dir_all(home).unwrap();
    std::fs::write(
        home.join("auth.json"),
        json!({"access_token": access, "refresh_token": refresh}).to_string(),
    )
    .unwrap();
}

/// Escape special characters for JSON string embedding.
fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_sse_shape() {
        let body = chat_sse(&["Hel", "lo"]);
        assert!(body.contains(r#"{"chunk":"Hel"}"#));
        assert!(body.contains(r#"{"chunk":"lo"}"#));
        assert!(body.contains("event: agent_complete"));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }
}
