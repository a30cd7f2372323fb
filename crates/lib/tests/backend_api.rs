//! Integration test: stub backend on a free port, then drive the API client
//! and the session engine against it end-to-end. Does not require a real
//! assistant backend. The server task is left running when the test ends.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use lib::api::{ApiError, BackendClient};
use lib::session::{ChatSession, Role};
use serde_json::{json, Value};
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn stub_settings() -> Json<Value> {
    Json(json!({
        "active_model_id": "gemini-flash",
        "active_api_key_id": null,
        "models": [
            {
                "id": "gemini-flash",
                "name": "Gemini Flash",
                "provider": "Google",
                "model_id": "gemini-2.0-flash",
                "context_window": 1000000,
                "description": "Default model"
            }
        ],
        "api_keys": [],
        "theme": "dark",
        "system_prompt": "You are Aura.",
        "temperature": 0.7
    }))
}

async fn stub_history(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "messages": [
            { "role": "human", "content": format!("first message of {}", id) },
            { "role": "model", "content": "first reply" }
        ]
    }))
}

async fn stub_chat(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let message = body.get("message").and_then(|v| v.as_str()).unwrap_or("");
    if message == "boom" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Model unavailable" })),
        );
    }
    let thread_id = body.get("thread_id").and_then(|v| v.as_str());
    let mut payload = json!({ "response": format!("echo: {}", message) });
    if thread_id.is_none() {
        payload["thread_id"] = Value::String("thr-1".to_string());
    }
    (StatusCode::OK, Json(payload))
}

/// Start the stub backend and wait until it answers, mirroring how the
/// desktop waits for a responsive backend before chatting.
async fn start_stub() -> BackendClient {
    let port = free_port();
    let app = Router::new()
        .route("/api/v1/settings", get(stub_settings))
        .route("/api/v1/threads/:id", get(stub_history))
        .route("/api/v1/chat", post(stub_chat));
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("bind stub backend");
        let _ = axum::serve(listener, app).await;
    });

    let client = BackendClient::new(Some(format!("http://127.0.0.1:{}", port)));
    for _ in 0..100 {
        if client.get_settings().await.is_ok() {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("stub backend did not become responsive within 5s");
}

#[tokio::test]
async fn draft_send_promotes_thread_and_keeps_transcript() {
    let client = start_stub().await;
    let mut session = ChatSession::new();

    let pending = session.begin_send("Hello").expect("send starts");
    assert_eq!(pending.bound, None);
    let result = client
        .send_chat(&pending.text, pending.bound.as_deref())
        .await
        .map_err(|e| e.chat_display());
    let promoted = session.apply_send(result);

    assert_eq!(promoted.as_deref(), Some("thr-1"));
    assert_eq!(session.current_thread(), Some("thr-1"));
    let messages = session.transcript().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].content, "echo: Hello");
}

#[tokio::test]
async fn history_load_normalizes_wire_roles() {
    let client = start_stub().await;
    let mut session = ChatSession::new();

    let target = session.navigate(Some("thr-9".to_string())).expect("fetch requested");
    let result = client
        .thread_history(&target)
        .await
        .map_err(|e| e.to_string());
    session.apply_history(&target, result);

    let messages = session.transcript().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "first message of thr-9");
    assert_eq!(messages[1].role, Role::Model);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn chat_error_detail_becomes_synthetic_message() {
    let client = start_stub().await;
    let mut session = ChatSession::new();

    let pending = session.begin_send("boom").expect("send starts");
    let err = client
        .send_chat(&pending.text, pending.bound.as_deref())
        .await
        .expect_err("stub rejects this message");
    assert!(matches!(err, ApiError::Api(_)));
    session.apply_send(Err(err.chat_display()));

    let messages = session.transcript().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Error: Model unavailable");
    assert!(!session.is_loading());
}
