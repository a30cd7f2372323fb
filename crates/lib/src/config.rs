//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.aura/config.json`) and environment.
//! The client only needs to know where the backend lives and who the calendar
//! user is; everything else (models, keys, prompt) lives on the backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Calendar settings (account email for event queries).
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// Backend base URL and request timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the assistant backend (default "http://127.0.0.1:8000").
    /// Overridden by AURA_BACKEND_URL env when set.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds (default 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Calendar account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConfig {
    /// Email of the connected calendar account. Overridden by AURA_USER_EMAIL env.
    pub user_email: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Resolve the backend base URL: env AURA_BACKEND_URL overrides config.
pub fn resolve_backend_url(config: &Config) -> String {
    std::env::var("AURA_BACKEND_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.backend.base_url.trim().to_string())
}

/// Resolve the calendar user email: env AURA_USER_EMAIL overrides config.
pub fn resolve_user_email(config: &Config) -> Option<String> {
    std::env::var("AURA_USER_EMAIL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .calendar
                .user_email
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("AURA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".aura").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or AURA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Create the config directory and write a default config.json if none exists.
/// Returns the path written (or already present).
pub fn init_config(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config dir {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(&Config::default())?;
    std::fs::write(&path, contents)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_url_and_timeout() {
        let b = BackendConfig::default();
        assert_eq!(b.base_url, "http://127.0.0.1:8000");
        assert_eq!(b.timeout_secs, 120);
    }

    #[test]
    fn empty_json_parses_to_defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.backend.base_url, "http://127.0.0.1:8000");
        assert!(config.calendar.user_email.is_none());
    }

    #[test]
    fn camel_case_fields_round_trip() {
        let json = r#"{"backend":{"baseUrl":"http://example.com:9000","timeoutSecs":30},"calendar":{"userEmail":"me@example.com"}}"#;
        let config: Config = serde_json::from_str(json).expect("parse");
        assert_eq!(config.backend.base_url, "http://example.com:9000");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.calendar.user_email.as_deref(), Some("me@example.com"));
        let out = serde_json::to_string(&config).expect("serialize");
        assert!(out.contains("baseUrl"));
        assert!(out.contains("userEmail"));
    }
}
