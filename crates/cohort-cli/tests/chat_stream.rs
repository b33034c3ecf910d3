//! Integration tests for piped chat streaming.
//!
//! Drives the binary end-to-end against a mock backend: agents are loaded,
//! the message is routed, and the SSE reply is assembled in arrival order.

mod fixtures;

use std::sync::{Arc, Mutex};

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{agents_response, chat_sse, empty_history_response, seed_tokens, sse_response};
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Mounts the GET endpoints every chat startup touches.
async fn mount_startup_mocks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/agents/active"))
        .respond_with(agents_response())
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chat/history"))
        .respond_with(empty_history_response())
        .mount(server)
        .await;
}

#[tokio::test]
async fn piped_message_streams_reply_to_stdout() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    seed_tokens(home.path(), "access-1", "refresh-1");
    mount_startup_mocks(&server).await;

    let request_body = Arc::new(Mutex::new(String::new()));
    let request_body_clone = request_body.clone();
    let reply = chat_sse(&["Hel", "lo"]);

    Mock::given(method("POST"))
        .and(path("/chat/send/stream"))
        .respond_with(move |req: &Request| {
            *request_body_clone.lock().unwrap() = String::from_utf8_lossy(&req.body).to_string();
            sse_response(&reply)
        })
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("cohort")
        .env("COHORT_HOME", home.path())
        .env("COHORT_API_URL", server.uri())
        .write_stdin("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello"));

    // No mention: the configured default agent handles the message.
    let body = request_body.lock().unwrap().clone();
    assert!(
        body.contains(r#""agentId":1"#),
        "default agent id should travel with the request. Got: {body}"
    );
    assert!(
        body.contains(r#""content":"hello""#),
        "content should be transmitted unchanged. Got: {body}"
    );

    // The assembled reply is persisted under the active session.
    let sessions = std::fs::read_to_string(home.path().join("sessions.json")).unwrap();
    assert!(
        sessions.contains("Hello"),
        "assembled reply should be persisted. Got: {sessions}"
    );
}

#[tokio::test]
async fn mention_routes_to_named_agent_with_clean_content() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    seed_tokens(home.path(), "access-1", "refresh-1");
    mount_startup_mocks(&server).await;

    let request_body = Arc::new(Mutex::new(String::new()));
    let request_body_clone = request_body.clone();
    let reply = chat_sse(&["4"]);

    Mock::given(method("POST"))
        .and(path("/chat/send/stream"))
        .respond_with(move |req: &Request| {
            *request_body_clone.lock().unwrap() = String::from_utf8_lossy(&req.body).to_string();
            sse_response(&reply)
        })
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("cohort")
        .env("COHORT_HOME", home.path())
        .env("COHORT_API_URL", server.uri())
        .write_stdin("@Tutor what is 2+2")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tutor"));

    let body = request_body.lock().unwrap().clone();
    assert!(
        body.contains(r#""agentId":2"#),
        "mention should resolve to the tutor. Got: {body}"
    );
    assert!(
        body.contains(r#""content":"what is 2+2""#),
        "mention token should be stripped from the content. Got: {body}"
    );
}

#[tokio::test]
async fn stream_error_lands_on_placeholder_without_retry() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    seed_tokens(home.path(), "access-1", "refresh-1");
    mount_startup_mocks(&server).await;

    // Error frame mid-stream; the stream is never re-attempted.
    let reply = "event: chunk\ndata: {\"chunk\":\"par\"}\n\n\
                 event: error\ndata: {\"error\":\"agent unavailable\"}\n\n\
                 data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/send/stream"))
        .respond_with(sse_response(reply))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("cohort")
        .env("COHORT_HOME", home.path())
        .env("COHORT_API_URL", server.uri())
        .write_stdin("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("response failed: agent unavailable"));

    let sessions = std::fs::read_to_string(home.path().join("sessions.json")).unwrap();
    assert!(
        sessions.contains("agent unavailable"),
        "inline error should be persisted on the placeholder. Got: {sessions}"
    );
}
