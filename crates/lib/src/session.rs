//! Chat session synchronization engine.
//!
//! Keeps one visible conversation consistent across thread switches,
//! responses that resolve after the user has navigated away, and the
//! promotion of a draft conversation into a persisted thread once the
//! backend assigns an id. Single-writer: all methods are called from one
//! thread (the UI loop or a test body); completions arrive tagged with the
//! thread id they were issued for and are checked against the current id
//! at completion time, never against a value captured at dispatch.

use serde::{Deserialize, Serialize};

use crate::api::{ChatReply, ThreadMessage};

/// Backend-assigned thread identifier (opaque string). A draft conversation
/// has no id yet and is represented as `None` wherever identity is tracked.
pub type ThreadId = String;

/// Display role of a transcript message. Wire labels are normalized here:
/// the backend stores a human-operator tag and a machine tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// "user" and "human" map to User; every other label to Model.
    pub fn from_wire(label: &str) -> Self {
        match label {
            "user" | "human" => Role::User,
            _ => Role::Model,
        }
    }
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }

    fn from_wire(msg: ThreadMessage) -> Self {
        Self {
            role: Role::from_wire(&msg.role),
            content: msg.content,
        }
    }
}

/// The ordered message list shown to the user. Two mutators only: full
/// replace (history load) and append (send pipeline). Discarded whole on
/// every identity change, never merged across threads.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}

/// A submitted message together with the thread identity captured at the
/// moment of submission. Outlives that identity if the user navigates
/// while the request is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub text: String,
    pub bound: Option<ThreadId>,
}

/// State of the visible conversation.
///
/// The busy flag is shared between history loads and sends: a send is
/// refused while any request is outstanding, but navigation always starts
/// a history load regardless.
#[derive(Debug, Default)]
pub struct ChatSession {
    thread: Option<ThreadId>,
    transcript: Transcript,
    loading: bool,
    pending: Option<PendingSend>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently displayed thread identity; None while on a draft.
    pub fn current_thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// True while a history load or a send is outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Switch the displayed conversation. The transcript resets to empty
    /// immediately, before any history arrives. Returns the thread id to
    /// fetch history for, or None when entering a draft (nothing to fetch).
    pub fn navigate(&mut self, target: Option<ThreadId>) -> Option<ThreadId> {
        self.thread = target.clone();
        self.transcript.replace(Vec::new());
        if let Some(id) = target {
            self.loading = true;
            Some(id)
        } else {
            None
        }
    }

    /// Commit a completed history fetch. `for_thread` is the id the fetch
    /// was issued for; when it no longer matches the current identity the
    /// whole completion is discarded, including the loading-flag clear, so
    /// a stale result cannot blank the indicator of a newer pending load.
    pub fn apply_history(
        &mut self,
        for_thread: &str,
        result: Result<Vec<ThreadMessage>, String>,
    ) {
        if self.thread.as_deref() != Some(for_thread) {
            log::debug!("discarding stale history for thread {}", for_thread);
            return;
        }
        match result {
            Ok(messages) => {
                self.transcript
                    .replace(messages.into_iter().map(ChatMessage::from_wire).collect());
            }
            Err(e) => {
                // Transcript stays at its previous state; no partial writes.
                log::warn!("failed to fetch history for thread {}: {}", for_thread, e);
            }
        }
        self.loading = false;
    }

    /// Start a send: trim, refuse empty input or a second request while one
    /// is outstanding, append the user message optimistically, and capture
    /// the bound identity. Returns the request for the caller to dispatch,
    /// or None when nothing was started.
    pub fn begin_send(&mut self, input: &str) -> Option<PendingSend> {
        let text = input.trim();
        if text.is_empty() || self.loading {
            return None;
        }
        self.loading = true;
        self.transcript.push(ChatMessage::user(text));
        let pending = PendingSend {
            text: text.to_string(),
            bound: self.thread.clone(),
        };
        self.pending = Some(pending.clone());
        Some(pending)
    }

    /// Reconcile a completed send. On success from a draft, a returned
    /// thread id renames the conversation in place: the identity advances
    /// but the transcript built during the draft survives intact, with no
    /// reload, which would duplicate the exchange or blank the screen.
    /// The returned id tells the caller to update its navigation surface
    /// silently. On failure the given text becomes one synthetic
    /// model-role message; the optimistic user message is never removed.
    pub fn apply_send(&mut self, result: Result<ChatReply, String>) -> Option<ThreadId> {
        let Some(pending) = self.pending.take() else {
            log::warn!("send completion with no pending send");
            return None;
        };
        let mut promoted = None;
        match result {
            Ok(reply) => {
                if pending.bound.is_none() {
                    if let Some(id) = reply.thread_id {
                        self.thread = Some(id.clone());
                        promoted = Some(id);
                    }
                }
                // Appended to whatever transcript is current, even if the
                // user navigated mid-send. See DESIGN.md for the record of
                // this decision.
                self.transcript.push(ChatMessage::model(reply.response));
            }
            Err(text) => {
                self.transcript.push(ChatMessage::model(text));
            }
        }
        self.loading = false;
        promoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(role: &str, content: &str) -> ThreadMessage {
        ThreadMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    fn reply(response: &str, thread_id: Option<&str>) -> ChatReply {
        ChatReply {
            response: response.to_string(),
            thread_id: thread_id.map(String::from),
        }
    }

    #[test]
    fn wire_roles_normalize_to_two_values() {
        assert_eq!(Role::from_wire("user"), Role::User);
        assert_eq!(Role::from_wire("human"), Role::User);
        assert_eq!(Role::from_wire("model"), Role::Model);
        assert_eq!(Role::from_wire("assistant"), Role::Model);
    }

    #[test]
    fn whitespace_only_input_is_inert() {
        let mut s = ChatSession::new();
        assert!(s.begin_send("   \n\t").is_none());
        assert!(s.transcript().is_empty());
        assert!(!s.is_loading());
    }

    #[test]
    fn second_send_while_in_flight_is_a_no_op() {
        let mut s = ChatSession::new();
        assert!(s.begin_send("first").is_some());
        assert!(s.begin_send("second").is_none());
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript().messages()[0], ChatMessage::user("first"));
    }

    #[test]
    fn navigation_resets_transcript_immediately() {
        let mut s = ChatSession::new();
        let req = s.navigate(Some("abc123".to_string()));
        assert_eq!(req.as_deref(), Some("abc123"));
        s.apply_history("abc123", Ok(vec![wire("human", "hi"), wire("model", "hello")]));
        assert_eq!(s.transcript().len(), 2);

        // Switching threads blanks the view before any history arrives.
        let req = s.navigate(Some("xyz789".to_string()));
        assert_eq!(req.as_deref(), Some("xyz789"));
        assert!(s.transcript().is_empty());
        assert!(s.is_loading());
    }

    #[test]
    fn stale_history_is_discarded_and_last_navigation_wins() {
        let mut s = ChatSession::new();
        s.navigate(Some("abc123".to_string()));
        s.navigate(Some("xyz789".to_string()));

        // The fetch for abc123 resolves after we already left it.
        s.apply_history("abc123", Ok(vec![wire("user", "from abc123")]));
        assert!(s.transcript().is_empty());
        assert!(s.is_loading(), "stale result must not clear the newer load's indicator");

        s.apply_history("xyz789", Ok(vec![wire("user", "from xyz789")]));
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript().messages()[0].content, "from xyz789");
        assert!(!s.is_loading());
    }

    #[test]
    fn out_of_order_completions_settle_on_last_identity() {
        let mut s = ChatSession::new();
        for id in ["t1", "t2", "t3"] {
            s.navigate(Some(id.to_string()));
        }
        // Completions arrive in a different order than the navigations.
        s.apply_history("t2", Ok(vec![wire("user", "two")]));
        s.apply_history("t3", Ok(vec![wire("user", "three")]));
        s.apply_history("t1", Ok(vec![wire("user", "one")]));
        assert_eq!(s.current_thread(), Some("t3"));
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript().messages()[0].content, "three");
    }

    #[test]
    fn stale_history_failure_does_not_clear_newer_loading_flag() {
        let mut s = ChatSession::new();
        s.navigate(Some("abc123".to_string()));
        s.navigate(Some("xyz789".to_string()));
        s.apply_history("abc123", Err("connection reset".to_string()));
        assert!(s.is_loading());
    }

    #[test]
    fn history_failure_leaves_transcript_untouched() {
        let mut s = ChatSession::new();
        s.navigate(Some("abc123".to_string()));
        s.apply_history("abc123", Err("503 unavailable".to_string()));
        assert!(s.transcript().is_empty());
        assert!(!s.is_loading());
    }

    #[test]
    fn draft_send_promotes_identity_without_reload() {
        let mut s = ChatSession::new();
        s.navigate(None);

        let pending = s.begin_send("Hello").expect("send starts");
        assert_eq!(pending.bound, None);
        assert_eq!(s.transcript().messages()[0], ChatMessage::user("Hello"));

        let promoted = s.apply_send(Ok(reply("Hi there", Some("abc123"))));
        assert_eq!(promoted.as_deref(), Some("abc123"));
        assert_eq!(s.current_thread(), Some("abc123"));
        assert_eq!(
            s.transcript().messages(),
            &[ChatMessage::user("Hello"), ChatMessage::model("Hi there")]
        );
        assert!(!s.is_loading());
    }

    #[test]
    fn promotion_preserves_draft_transcript_across_later_sends() {
        let mut s = ChatSession::new();
        s.begin_send("Hello").expect("send starts");
        s.apply_send(Ok(reply("Hi there", Some("abc123"))));

        // Next send is bound to the promoted id and extends the same view.
        let pending = s.begin_send("How are you?").expect("send starts");
        assert_eq!(pending.bound.as_deref(), Some("abc123"));
        let promoted = s.apply_send(Ok(reply("Fine.", None)));
        assert!(promoted.is_none());
        assert_eq!(s.transcript().len(), 4);
    }

    #[test]
    fn existing_thread_send_ignores_returned_thread_id() {
        let mut s = ChatSession::new();
        s.navigate(Some("abc123".to_string()));
        s.apply_history("abc123", Ok(Vec::new()));
        s.begin_send("ping").expect("send starts");
        let promoted = s.apply_send(Ok(reply("pong", Some("other"))));
        assert!(promoted.is_none());
        assert_eq!(s.current_thread(), Some("abc123"));
    }

    #[test]
    fn failed_send_appends_single_error_message() {
        let mut s = ChatSession::new();
        s.begin_send("Hello").expect("send starts");
        let promoted = s.apply_send(Err("Error: Connection failed.".to_string()));
        assert!(promoted.is_none());
        assert_eq!(
            s.transcript().messages(),
            &[
                ChatMessage::user("Hello"),
                ChatMessage::model("Error: Connection failed."),
            ]
        );
        assert!(!s.is_loading());
    }

    // Documents the carried-over behavior: a send that resolves after the
    // user navigated away appends its reply to whatever transcript is
    // current. See the open-question record in DESIGN.md.
    #[test]
    fn send_reply_lands_on_current_transcript_after_navigation() {
        let mut s = ChatSession::new();
        s.navigate(Some("abc123".to_string()));
        s.apply_history("abc123", Ok(Vec::new()));
        s.begin_send("question for abc123").expect("send starts");

        s.navigate(Some("xyz789".to_string()));
        s.apply_history("xyz789", Ok(Vec::new()));

        s.apply_send(Ok(reply("answer meant for abc123", None)));
        assert_eq!(s.current_thread(), Some("xyz789"));
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript().messages()[0].content, "answer meant for abc123");
    }
}
