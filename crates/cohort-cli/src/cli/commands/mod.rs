//! Command handlers.

pub mod agents;
pub mod auth;
pub mod chat;
pub mod config;
pub mod sessions;
