//! Aura core library: config, backend API client, and the chat session
//! synchronization engine used by both the CLI and desktop applications.

pub mod api;
pub mod config;
pub mod session;
