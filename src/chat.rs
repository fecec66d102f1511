//! Conversation state kept per chat session.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Greeting every conversation starts with.
pub const GREETING: &str = "I am ready to use. Ask anything about the document.";

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The person asking questions.
    User,
    /// The answering model.
    Assistant,
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

/// Ordered message history, seeded with the assistant greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    /// Fresh conversation containing only the greeting.
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage {
                role: ChatRole::Assistant,
                content: GREETING.to_string(),
            }],
        }
    }

    /// Append a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        });
    }

    /// Append an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
        });
    }

    /// Messages in the order they were added.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drop everything but the greeting.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

const DEFAULT_MAX_SESSIONS: usize = 1024;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct SessionEntry {
    state: ConversationState,
    last_active: Instant,
}

/// Conversations keyed by session id.
///
/// Sessions idle for longer than the timeout are dropped on the next access. When the store is
/// full, starting a session evicts the least recently active one.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    /// Store with the default capacity and idle timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `max_sessions` sessions, each expiring after `idle_timeout`.
    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    async fn live_sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SessionEntry>> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_active) < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "Dropped idle chat sessions");
        }
        sessions
    }

    /// Start a session holding its first exchange and return its id.
    pub async fn start(&self, question: &str, answer: &str) -> Uuid {
        let mut sessions = self.live_sessions().await;
        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_active)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                sessions.remove(&id);
                tracing::debug!(session_id = %id, "Evicted least recently active chat session");
            }
        }

        let mut state = ConversationState::new();
        state.push_user(question);
        state.push_assistant(answer);
        let id = Uuid::new_v4();
        sessions.insert(
            id,
            SessionEntry {
                state,
                last_active: Instant::now(),
            },
        );
        id
    }

    /// Whether `id` names a live session.
    pub async fn contains(&self, id: Uuid) -> bool {
        self.live_sessions().await.contains_key(&id)
    }

    /// Append a completed exchange to an existing session. Returns `false` for unknown ids.
    pub async fn record_exchange(&self, id: Uuid, question: &str, answer: &str) -> bool {
        match self.live_sessions().await.get_mut(&id) {
            Some(entry) => {
                entry.state.push_user(question);
                entry.state.push_assistant(answer);
                entry.last_active = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Copy of a session's history.
    pub async fn history(&self, id: Uuid) -> Option<Vec<ChatMessage>> {
        self.live_sessions()
            .await
            .get(&id)
            .map(|entry| entry.state.messages().to_vec())
    }

    /// Reset a session to the greeting. Returns `false` for unknown ids.
    pub async fn reset(&self, id: Uuid) -> bool {
        match self.live_sessions().await.get_mut(&id) {
            Some(entry) => {
                entry.state.reset();
                entry.last_active = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.live_sessions().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_starts_with_greeting_and_resets() {
        let mut state = ConversationState::new();
        state.push_user("What is the total?");
        state.push_assistant("42");
        assert_eq!(state.messages().len(), 3);
        assert_eq!(state.messages()[1].role, ChatRole::User);

        state.reset();
        assert_eq!(state.messages(), ConversationState::new().messages());
        assert_eq!(state.messages()[0].content, GREETING);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage {
            role: ChatRole::Assistant,
            content: "hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({ "role": "assistant", "content": "hi" })
        );
    }

    #[tokio::test]
    async fn session_store_tracks_exchanges() {
        let store = SessionStore::new();
        let id = store.start("q", "a").await;
        assert!(store.record_exchange(id, "q2", "a2").await);

        let history = store.history(id).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].content, "a");
        assert_eq!(history[4].content, "a2");

        assert!(store.reset(id).await);
        assert_eq!(store.history(id).await.unwrap().len(), 1);
        assert!(!store.reset(Uuid::new_v4()).await);
        assert!(store.history(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn unknown_ids_never_create_sessions() {
        let store = SessionStore::new();
        for _ in 0..5 {
            assert!(!store.record_exchange(Uuid::new_v4(), "q", "a").await);
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn full_store_evicts_least_recently_active_session() {
        let store = SessionStore::with_limits(2, DEFAULT_IDLE_TIMEOUT);
        let first = store.start("q1", "a1").await;
        let second = store.start("q2", "a2").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.record_exchange(first, "again", "sure").await);

        let third = store.start("q3", "a3").await;
        assert_eq!(store.len().await, 2);
        assert!(store.contains(first).await);
        assert!(!store.contains(second).await);
        assert!(store.contains(third).await);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::with_limits(8, Duration::ZERO);
        let id = store.start("q", "a").await;
        assert!(!store.contains(id).await);
        assert!(!store.record_exchange(id, "q", "a").await);
        assert!(store.is_empty().await);
    }
}
