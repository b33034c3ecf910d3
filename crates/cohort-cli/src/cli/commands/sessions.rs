//! Session command handlers.

use anyhow::{Context, Result};
use cohort_core::config;
use cohort_core::session::SessionStore;

pub fn list() -> Result<()> {
    let store = SessionStore::load(config::paths::sessions_path());
    for id in store.session_ids() {
        let marker = if id == store.active() { "*" } else { " " };
        println!("{marker} {id}  {} messages", store.messages(id).len());
    }
    Ok(())
}

pub fn new() -> Result<()> {
    let mut store = SessionStore::load(config::paths::sessions_path());
    let id = store.create_session();
    store.save().context("persist sessions")?;
    println!("Started session {id}");
    Ok(())
}

pub fn switch(id: &str) -> Result<()> {
    let mut store = SessionStore::load(config::paths::sessions_path());
    store.switch_session(id);
    store.save().context("persist sessions")?;
    println!("Switched to session {id}");
    Ok(())
}
