//! Assistant backend API client (http://127.0.0.1:8000 by default).
//! Plain request/response JSON under /api/v1: threads, chat, settings,
//! diagnostics, and calendar events.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Client for the assistant backend HTTP API.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend api error: {0}")]
    Api(String),
}

impl ApiError {
    /// Text shown in the transcript when a send fails: the backend's `detail`
    /// for a non-2xx response, a generic line for a transport failure.
    pub fn chat_display(&self) -> String {
        match self {
            ApiError::Request(_) => "Error: Connection failed.".to_string(),
            ApiError::Api(detail) => format!("Error: {}", detail),
        }
    }
}

/// Thread list entry (sidebar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
}

/// A message as stored by the backend; `role` is a wire label ("user",
/// "human", "model", ...) normalized by the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ThreadHistoryResponse {
    #[serde(default)]
    messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    thread_id: Option<&'a str>,
}

/// Backend reply to a chat send. `thread_id` is present only when a draft
/// conversation was just promoted to a persisted thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

/// A configured model in the backend settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub model_id: String,
    pub context_window: u64,
    #[serde(default)]
    pub description: String,
}

/// A stored API key in the backend settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

impl ApiKey {
    /// New key entry with a generated id and current timestamp, the way the
    /// settings screen creates them before posting the document back.
    pub fn generate(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            name: name.into(),
            description: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
        }
    }
}

/// Full backend settings document. Read and written whole; the client never
/// patches individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub active_model_id: String,
    #[serde(default)]
    pub active_api_key_id: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    0.7
}

/// One step in the backend diagnostics log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticStep {
    pub step: String,
    pub status: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub timestamp: f64,
}

/// Result of GET /api/v1/debug/diagnose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnoseReport {
    pub env_api_key_present: bool,
    #[serde(default)]
    pub active_model_id: String,
    #[serde(default)]
    pub logs: Vec<DiagnosticStep>,
    pub success: bool,
}

/// Event start/end: timed events carry `dateTime`, all-day events `date`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl EventTime {
    /// Parse the RFC 3339 `dateTime` when present.
    pub fn parsed(&self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        self.date_time
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
    }
}

/// A calendar event as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
}

/// Payload for creating or updating a calendar event.
#[derive(Debug, Clone, Serialize)]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
}

impl BackendClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Client from loaded config: resolved base URL and request timeout.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, ApiError> {
        let base_url = crate::config::resolve_backend_url(config)
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.timeout_secs))
            .build()?;
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// GET /api/v1/threads/: list threads for the sidebar.
    pub async fn list_threads(&self) -> Result<Vec<ThreadSummary>, ApiError> {
        let res = self.client.get(self.url("/threads/")).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }

    /// GET /api/v1/threads/{id}: full message history of one thread.
    pub async fn thread_history(&self, id: &str) -> Result<Vec<ThreadMessage>, ApiError> {
        let res = self
            .client
            .get(self.url(&format!("/threads/{}", id)))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        let data: ThreadHistoryResponse = res.json().await?;
        Ok(data.messages)
    }

    /// DELETE /api/v1/threads/{id}.
    pub async fn delete_thread(&self, id: &str) -> Result<(), ApiError> {
        let res = self
            .client
            .delete(self.url(&format!("/threads/{}", id)))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }

    /// POST /api/v1/chat: send a message bound to a thread (or a draft when
    /// `thread_id` is None). Non-2xx responses surface the backend `detail`.
    pub async fn send_chat(
        &self,
        message: &str,
        thread_id: Option<&str>,
    ) -> Result<ChatReply, ApiError> {
        let body = ChatRequest { message, thread_id };
        let res = self
            .client
            .post(self.url("/chat"))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let detail = res
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| "Request failed".to_string());
            return Err(ApiError::Api(detail));
        }
        Ok(res.json().await?)
    }

    /// GET /api/v1/settings: full settings document.
    pub async fn get_settings(&self) -> Result<AppSettings, ApiError> {
        let res = self.client.get(self.url("/settings")).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }

    /// POST /api/v1/settings: write the full settings document back.
    pub async fn update_settings(&self, settings: &AppSettings) -> Result<(), ApiError> {
        let res = self
            .client
            .post(self.url("/settings"))
            .json(settings)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }

    /// GET /api/v1/debug/diagnose: run backend self-checks.
    pub async fn diagnose(&self) -> Result<DiagnoseReport, ApiError> {
        let res = self.client.get(self.url("/debug/diagnose")).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }

    /// GET /api/v1/calendar/events: events for the given window.
    pub async fn list_events(
        &self,
        user_email: &str,
        time_min: &str,
        time_max: &str,
    ) -> Result<Vec<CalendarEvent>, ApiError> {
        let res = self
            .client
            .get(self.url("/calendar/events"))
            .query(&[
                ("user_email", user_email),
                ("time_min", time_min),
                ("time_max", time_max),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }

    /// POST /api/v1/calendar/events: create an event.
    pub async fn create_event(
        &self,
        user_email: &str,
        draft: &EventDraft,
    ) -> Result<(), ApiError> {
        let res = self
            .client
            .post(self.url("/calendar/events"))
            .query(&[("user_email", user_email)])
            .json(draft)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }

    /// PATCH /api/v1/calendar/events/{id}: update an event.
    pub async fn update_event(
        &self,
        user_email: &str,
        id: &str,
        draft: &EventDraft,
    ) -> Result<(), ApiError> {
        let res = self
            .client
            .patch(self.url(&format!("/calendar/events/{}", id)))
            .query(&[("user_email", user_email)])
            .json(draft)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }

    /// DELETE /api/v1/calendar/events/{id}.
    pub async fn delete_event(&self, user_email: &str, id: &str) -> Result<(), ApiError> {
        let res = self
            .client
            .delete(self.url(&format!("/calendar/events/{}", id)))
            .query(&[("user_email", user_email)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_reply_thread_id_defaults_to_none() {
        let reply: ChatReply = serde_json::from_str(r#"{"response":"hi"}"#).expect("parse");
        assert_eq!(reply.response, "hi");
        assert!(reply.thread_id.is_none());
    }

    #[test]
    fn settings_document_tolerates_missing_fields() {
        let s: AppSettings =
            serde_json::from_str(r#"{"active_model_id":"m1","models":[]}"#).expect("parse");
        assert_eq!(s.active_model_id, "m1");
        assert!(s.api_keys.is_empty());
        assert_eq!(s.temperature, 0.7);
    }

    #[test]
    fn event_time_parses_rfc3339_date_time() {
        let t = EventTime {
            date_time: Some("2026-03-14T09:30:00+00:00".to_string()),
            date: None,
        };
        let parsed = t.parsed().expect("parse");
        assert_eq!(parsed.to_rfc3339(), "2026-03-14T09:30:00+00:00");
        assert!(EventTime::default().parsed().is_none());
    }

    #[test]
    fn generated_api_key_has_id_and_timestamp() {
        let k = ApiKey::generate("work", "sk-123");
        assert!(!k.id.is_empty());
        assert_eq!(k.name, "work");
        assert_eq!(k.key, "sk-123");
        assert!(chrono::DateTime::parse_from_rfc3339(&k.created_at).is_ok());
    }
}
