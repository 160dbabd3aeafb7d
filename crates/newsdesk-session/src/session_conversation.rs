use std::time::{Duration, Instant};

use newsdesk_ai::{ChatRequest, ChatUsage, LlmClient, Message, MessageRole, NewsdeskAiError};
use newsdesk_core::elapsed_ms_since;

use crate::{SessionError, SessionStore};

#[derive(Debug, Clone, PartialEq)]
/// Completion settings applied to every conversation turn.
pub struct ConversationConfig {
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub completion_timeout_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: String::new(),
            temperature: 0.0,
            max_tokens: None,
            completion_timeout_ms: 90_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationReply {
    pub text: String,
    pub usage: ChatUsage,
    pub history_len: usize,
}

/// Runs one user turn: prompt the model with the session's history, then
/// record both sides of the exchange.
///
/// A blank reply counts as a failed completion.
/// The session lock is held from history render through append, so concurrent
/// events for the same user are applied one at a time. A failed or timed out
/// completion leaves the session untouched.
pub async fn run_conversation_turn(
    store: &SessionStore,
    client: &dyn LlmClient,
    config: &ConversationConfig,
    user_id: &str,
    human_input: &str,
) -> Result<ConversationReply, SessionError> {
    let handle = store.get_or_create(user_id)?;
    let mut session = handle.lock().await;

    let request = build_chat_request(config, &session.render_history(), human_input);
    let started = Instant::now();
    let timeout = Duration::from_millis(config.completion_timeout_ms.max(1));
    let response = match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(error)) => return Err(SessionError::CompletionFailed(error)),
        Err(_) => {
            return Err(SessionError::CompletionTimedOut {
                timeout_ms: config.completion_timeout_ms,
            })
        }
    };

    let text = response.message.text_content().to_string();
    if text.trim().is_empty() {
        return Err(SessionError::CompletionFailed(
            NewsdeskAiError::InvalidResponse(format!(
                "empty completion (finish_reason: {})",
                response.finish_reason.as_deref().unwrap_or("none")
            )),
        ));
    }
    session.append_turn(MessageRole::User, human_input);
    session.append_turn(MessageRole::Assistant, text.as_str());
    tracing::debug!(
        user_id,
        latency_ms = elapsed_ms_since(started),
        history_len = session.len(),
        total_tokens = response.usage.total_tokens,
        "conversation turn completed"
    );

    Ok(ConversationReply {
        text,
        usage: response.usage,
        history_len: session.len(),
    })
}

fn build_chat_request(
    config: &ConversationConfig,
    history: &[crate::Turn],
    human_input: &str,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !config.system_prompt.trim().is_empty() {
        messages.push(Message::system(config.system_prompt.as_str()));
    }
    messages.extend(
        history
            .iter()
            .map(|turn| Message::new(turn.role, turn.text.as_str())),
    );
    messages.push(Message::user(human_input));

    ChatRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature: Some(config.temperature),
    }
}
