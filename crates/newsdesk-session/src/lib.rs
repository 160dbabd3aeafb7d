//! Per-user conversation sessions with bounded history.
//!
//! `SessionStore` keeps exactly one live `Session` per Slack user id. Each
//! session holds at most `history_window` turns; appending past the window
//! evicts the oldest turn first. Nothing here is persisted.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use newsdesk_ai::{MessageRole, NewsdeskAiError};
use thiserror::Error;

mod session_conversation;

pub use session_conversation::{run_conversation_turn, ConversationConfig, ConversationReply};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Error)]
/// Failures raised while resolving a session or running a turn against it.
pub enum SessionError {
    #[error("invalid user identity '{0}'")]
    InvalidIdentity(String),
    #[error("completion failed: {0}")]
    CompletionFailed(#[source] NewsdeskAiError),
    #[error("completion timed out after {timeout_ms}ms")]
    CompletionTimedOut { timeout_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One (speaker, text) entry in a session's history.
pub struct Turn {
    pub role: MessageRole,
    pub text: String,
}

impl Turn {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug)]
/// Rolling conversation context for a single user.
pub struct Session {
    user_id: String,
    capacity: usize,
    history: VecDeque<Turn>,
}

impl Session {
    fn new(user_id: &str, capacity: usize) -> Self {
        Self {
            user_id: user_id.to_string(),
            capacity,
            history: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Appends a turn, evicting from the front until the window holds again.
    pub fn append_turn(&mut self, role: MessageRole, text: impl Into<String>) {
        self.history.push_back(Turn::new(role, text));
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// Returns the retained turns, oldest first.
    pub fn render_history(&self) -> Vec<Turn> {
        self.history.iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
/// Shared handle on one user's session.
pub struct SessionHandle {
    inner: Arc<tokio::sync::Mutex<Session>>,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(session)),
        }
    }

    /// Waits for exclusive access. Held across a completion call, this
    /// serializes events from the same user.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Session> {
        self.inner.lock().await
    }

    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug)]
/// Owned mapping from user id to that user's session.
pub struct SessionStore {
    window: usize,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl SessionStore {
    /// Creates an empty store. A zero window is lifted to one turn.
    pub fn new(history_window: usize) -> Self {
        Self {
            window: history_window.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn history_window(&self) -> usize {
        self.window
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the session for `user_id`, creating an empty one on first use.
    pub fn get_or_create(&self, user_id: &str) -> Result<SessionHandle, SessionError> {
        validate_user_identity(user_id)?;
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(user_id) {
            return Ok(existing.clone());
        }
        let handle = SessionHandle::new(Session::new(user_id, self.window));
        sessions.insert(user_id.to_string(), handle.clone());
        tracing::debug!(
            user_id,
            sessions = sessions.len(),
            window = self.window,
            "session created"
        );
        Ok(handle)
    }
}

fn validate_user_identity(user_id: &str) -> Result<(), SessionError> {
    let malformed = user_id.trim().is_empty()
        || user_id
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control());
    if malformed {
        return Err(SessionError::InvalidIdentity(user_id.to_string()));
    }
    Ok(())
}
