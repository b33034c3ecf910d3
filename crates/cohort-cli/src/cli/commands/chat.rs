//! Chat command handler.

use std::io::{BufRead, IsTerminal, Read, Write};

use anyhow::{Context, Result};
use chrono::Utc;
use cohort_core::agents::AgentRegistry;
use cohort_core::api::ApiClient;
use cohort_core::chat::ChatStreamEvent;
use cohort_core::config::{self, Config};
use cohort_core::session::{Message, SessionStore};
use futures_util::StreamExt;
use tracing::{debug, warn};

pub async fn run(config: &Config, session_override: Option<&str>) -> Result<()> {
    let home = config::paths::cohort_home();
    let api = ApiClient::new(config, home).context("build API client")?;

    let mut store = SessionStore::load(config::paths::sessions_path());
    if let Some(id) = session_override {
        store.switch_session(id);
    }

    let mut registry = AgentRegistry::new();
    if let Err(e) = registry.refresh(&api).await {
        warn!("failed to load agents: {e}");
    }

    // Merge server history into the active session; local state stands on
    // failure.
    let active = store.active().to_string();
    match api.chat_history(&active).await {
        Ok(page) => store.merge_history(&active, &page.history),
        Err(e) => debug!("no server history for {active}: {e}"),
    }
    store.save().context("persist sessions")?;

    // If stdin is piped, send it as a single message instead
    if !std::io::stdin().is_terminal() {
        let mut prompt = String::new();
        std::io::stdin().lock().read_to_string(&mut prompt)?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            anyhow::bail!("No input provided via pipe");
        }
        return send_message(&api, &mut store, &registry, config, prompt).await;
    }

    run_interactive(&api, &mut store, &registry, config).await
}

async fn run_interactive(
    api: &ApiClient,
    store: &mut SessionStore,
    registry: &AgentRegistry,
    config: &Config,
) -> Result<()> {
    println!("session {}", store.active());
    println!("/new starts a fresh session, /quit exits");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let input = line.trim();

        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/new" => {
                let id = store.create_session();
                store.save().context("persist sessions")?;
                println!("started session {id}");
            }
            "/sessions" => {
                for id in store.session_ids() {
                    let marker = if id == store.active() { "*" } else { " " };
                    println!("{marker} {id}  {} messages", store.messages(id).len());
                }
            }
            "/agents" => {
                if registry.is_empty() {
                    println!("no agents loaded");
                }
                for agent in registry.agents() {
                    println!("@{}  ({})", agent.display_name, agent.name);
                }
            }
            _ => {
                if let Some(id) = input.strip_prefix("/switch ") {
                    store.switch_session(id.trim());
                    store.save().context("persist sessions")?;
                    println!("switched to session {}", store.active());
                    continue;
                }
                send_message(api, store, registry, config, input).await?;
            }
        }
    }

    Ok(())
}

/// Sends one message and streams the reply to stdout, updating the session's
/// placeholder message in place as chunks arrive.
async fn send_message(
    api: &ApiClient,
    store: &mut SessionStore,
    registry: &AgentRegistry,
    config: &Config,
    content: &str,
) -> Result<()> {
    let session_id = store.active().to_string();
    let history = store.messages(&session_id);
    let target = registry.select_reply_target(content, history.last(), &config.default_agent);
    let clean = registry.parse_mention(content).clean;

    let now = Utc::now().timestamp_millis();
    store.append_message(&session_id, Message::user(format!("user-{now}"), content));

    let mut reply = Message::placeholder(format!("agent-{now}"), target.sender());
    store.append_message(&session_id, reply.clone());
    store.save().context("persist sessions")?;

    let mut stream = match api
        .send_message_stream(&session_id, &clean, target.agent_id())
        .await
    {
        Ok(stream) => stream,
        Err(e) if e.is_session_expired() => {
            return Err(e).context("session expired; run `cohort login` to authenticate");
        }
        Err(e) => {
            // Surfaced inline on the placeholder, not retried.
            reply.content = format!("response failed: {e}");
            reply.is_typing = None;
            store.append_message(&session_id, reply);
            store.save().context("persist sessions")?;
            println!("response failed: {e}");
            return Ok(());
        }
    };

    print!("{}: ", target.display_name());
    std::io::stdout().flush().ok();

    while let Some(event) = stream.next().await {
        match event {
            Ok(ChatStreamEvent::Chunk(text)) => {
                print!("{text}");
                std::io::stdout().flush().ok();
                reply.content.push_str(&text);
                store.append_message(&session_id, reply.clone());
            }
            Ok(ChatStreamEvent::Completed(Some(_record))) => {
                debug!("completion record received");
            }
            Ok(ChatStreamEvent::Completed(None)) => break,
            Ok(ChatStreamEvent::Error(message)) => {
                println!();
                println!("response failed: {message}");
                reply.content.push_str(&format!("\nresponse failed: {message}"));
                store.append_message(&session_id, reply.clone());
            }
            Ok(ChatStreamEvent::Status(_)) => {}
            Err(e) => {
                println!();
                println!("response failed: {e}");
                reply.content.push_str(&format!("\nresponse failed: {e}"));
                store.append_message(&session_id, reply.clone());
                break;
            }
        }
    }
    println!();

    reply.is_typing = None;
    store.append_message(&session_id, reply);
    store.save().context("persist sessions")?;
    Ok(())
}
