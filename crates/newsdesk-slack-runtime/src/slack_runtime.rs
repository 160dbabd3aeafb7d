//! Slack runtime that turns inbound events into model replies.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Result;
use newsdesk_ai::LlmClient;
use newsdesk_session::{run_conversation_turn, ConversationConfig, SessionError, SessionStore};

use crate::slack_helpers::{truncate_for_slack, SLACK_REPLY_MAX_CHARS};

mod slack_api_client;
mod slack_event_parsing;
mod slack_http_ingress;
mod slack_processed_events;
mod slack_prompt_templates;
mod slack_signature;
mod slack_socket_ingress;

use slack_api_client::{SlackApiClient, SlackApiClientConfig};
use slack_processed_events::ProcessedEventLog;

pub use slack_event_parsing::strip_mention_tokens;
pub use slack_prompt_templates::PromptTemplateKind;
pub use slack_signature::SlackSignatureError;

const COMPLETION_FAILURE_REPLY: &str =
    "Sorry, I couldn't get a response from the language model just now. Please try again in a moment.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// How Slack delivers events to the bot.
pub enum SlackTransportMode {
    /// Events API over signed HTTP requests.
    #[default]
    Http,
    /// Socket Mode websocket opened with the app-level token.
    Socket,
}

impl SlackTransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Socket => "socket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Plain channel or DM message; replied to in the channel.
    Message,
    /// `app_mention`; replied to in the mention's thread, addressed to the user.
    Mention { thread_ts: String },
    /// Slash command; replied to in the channel, addressed to the user.
    Command { name: String },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Mention { .. } => "mention",
            Self::Command { .. } => "command",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Transport-neutral inbound event.
pub struct SlackInboundEvent {
    pub dedupe_key: String,
    pub kind: EventKind,
    pub user_id: String,
    pub channel_id: String,
    /// Raw text as delivered, mention tokens included.
    pub text: String,
    pub ts: String,
}

#[derive(Clone)]
/// Runtime configuration for the Slack bot.
pub struct SlackRuntimeConfig {
    pub llm_client: Arc<dyn LlmClient>,
    pub transport: SlackTransportMode,
    pub api_base: String,
    pub bot_token: String,
    pub app_token: Option<String>,
    pub signing_secret: Option<String>,
    pub bot_user_id: Option<String>,
    pub bind: String,
    pub history_window: usize,
    pub prompt_template: PromptTemplateKind,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub completion_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub processed_event_cap: usize,
    pub reconnect_delay: Duration,
}

impl SlackRuntimeConfig {
    fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            model: self.model.clone(),
            system_prompt: self.prompt_template.system_prompt().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            completion_timeout_ms: self.completion_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What `handle_inbound_event` did with an event.
pub enum SlackDispatchOutcome {
    Replied { channel_id: String, ts: String },
    /// The completion failed and the user was sent an apology instead.
    Apologized { channel_id: String, ts: String },
    /// A slash command arrived without text; the usage line was posted.
    SentUsage { channel_id: String, ts: String },
    SkippedDuplicate,
    SkippedEmptyText,
    DroppedInvalidIdentity,
}

/// Shared state for every event handled by one running bot.
pub struct SlackRuntimeContext {
    slack_client: SlackApiClient,
    llm_client: Arc<dyn LlmClient>,
    sessions: Arc<SessionStore>,
    conversation: ConversationConfig,
    bot_user_id: String,
    processed_events: Mutex<ProcessedEventLog>,
}

impl SlackRuntimeContext {
    /// Builds the Slack client and session store, resolving the bot's own user
    /// id through `auth.test` when it is not configured.
    pub async fn initialize(config: &SlackRuntimeConfig) -> Result<Arc<Self>> {
        let slack_client = SlackApiClient::new(SlackApiClientConfig {
            api_base: config.api_base.clone(),
            app_token: config.app_token.clone(),
            bot_token: config.bot_token.clone(),
            request_timeout_ms: config.request_timeout_ms,
            retry_max_attempts: config.retry_max_attempts,
            retry_base_delay_ms: config.retry_base_delay_ms,
        })?;

        let bot_user_id = match config.bot_user_id.as_deref().map(str::trim) {
            Some(user_id) if !user_id.is_empty() => user_id.to_string(),
            _ => slack_client.resolve_bot_user_id().await?,
        };

        Ok(Arc::new(Self {
            slack_client,
            llm_client: Arc::clone(&config.llm_client),
            sessions: Arc::new(SessionStore::new(config.history_window)),
            conversation: config.conversation_config(),
            bot_user_id,
            processed_events: Mutex::new(ProcessedEventLog::new(config.processed_event_cap)),
        }))
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn mark_processed(&self, key: &str) -> bool {
        self.processed_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark_processed(key)
    }

    fn processed_event_count(&self) -> usize {
        self.processed_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Runs the bot on the configured transport until shutdown.
pub async fn run_slack_runtime(config: SlackRuntimeConfig) -> Result<()> {
    let context = SlackRuntimeContext::initialize(&config).await?;
    tracing::info!(
        transport = config.transport.as_str(),
        bot_user_id = context.bot_user_id(),
        history_window = context.sessions().history_window(),
        prompt_template = config.prompt_template.as_str(),
        model = %config.model,
        "newsdesk slack runtime starting"
    );
    match config.transport {
        SlackTransportMode::Http => {
            let signing_secret = config
                .signing_secret
                .clone()
                .filter(|secret| !secret.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("http transport requires a slack signing secret"))?;
            slack_http_ingress::run_http_ingress(context, config.bind.as_str(), signing_secret)
                .await
        }
        SlackTransportMode::Socket => {
            slack_socket_ingress::run_socket_ingress(context, config.reconnect_delay).await
        }
    }
}

/// Answers one inbound event.
///
/// Only Slack Web API failures surface as errors; completion failures turn
/// into an apology reply and malformed identities are dropped.
pub async fn handle_inbound_event(
    context: &SlackRuntimeContext,
    event: SlackInboundEvent,
) -> Result<SlackDispatchOutcome> {
    if !context.mark_processed(&event.dedupe_key) {
        tracing::debug!(
            dedupe_key = %event.dedupe_key,
            kind = event.kind.as_str(),
            "skipping duplicate slack event"
        );
        return Ok(SlackDispatchOutcome::SkippedDuplicate);
    }

    let human_input = strip_mention_tokens(&event.text);
    let (address, thread_ts) = match &event.kind {
        EventKind::Message => (None, None),
        EventKind::Mention { thread_ts } => {
            (Some(event.user_id.as_str()), Some(thread_ts.as_str()))
        }
        EventKind::Command { .. } => (Some(event.user_id.as_str()), None),
    };

    if human_input.is_empty() {
        let EventKind::Command { name } = &event.kind else {
            tracing::debug!(
                dedupe_key = %event.dedupe_key,
                kind = event.kind.as_str(),
                "ignoring slack event with no text"
            );
            return Ok(SlackDispatchOutcome::SkippedEmptyText);
        };
        let usage = format!("usage: {name} <story topic or question>");
        let posted = post_reply(context, &event, address, thread_ts, &usage).await?;
        return Ok(SlackDispatchOutcome::SentUsage {
            channel_id: posted.channel,
            ts: posted.ts,
        });
    }

    tracing::debug!(
        dedupe_key = %event.dedupe_key,
        kind = event.kind.as_str(),
        user_id = %event.user_id,
        channel_id = %event.channel_id,
        "dispatching slack event"
    );
    let result = run_conversation_turn(
        context.sessions.as_ref(),
        context.llm_client.as_ref(),
        &context.conversation,
        &event.user_id,
        &human_input,
    )
    .await;

    match result {
        Ok(reply) => {
            let posted = post_reply(context, &event, address, thread_ts, &reply.text).await?;
            Ok(SlackDispatchOutcome::Replied {
                channel_id: posted.channel,
                ts: posted.ts,
            })
        }
        Err(SessionError::InvalidIdentity(user_id)) => {
            tracing::warn!(
                dedupe_key = %event.dedupe_key,
                user_id = %user_id,
                "dropping slack event with invalid user identity"
            );
            Ok(SlackDispatchOutcome::DroppedInvalidIdentity)
        }
        Err(error) => {
            tracing::warn!(
                dedupe_key = %event.dedupe_key,
                user_id = %event.user_id,
                error = %error,
                "completion failed for slack event"
            );
            let posted = post_reply(
                context,
                &event,
                address,
                thread_ts,
                COMPLETION_FAILURE_REPLY,
            )
            .await?;
            Ok(SlackDispatchOutcome::Apologized {
                channel_id: posted.channel,
                ts: posted.ts,
            })
        }
    }
}

async fn post_reply(
    context: &SlackRuntimeContext,
    event: &SlackInboundEvent,
    address: Option<&str>,
    thread_ts: Option<&str>,
    body: &str,
) -> Result<slack_api_client::SlackPostedMessage> {
    let text = match address {
        Some(user_id) => format!("<@{user_id}> {body}"),
        None => body.to_string(),
    };
    let text = truncate_for_slack(&text, SLACK_REPLY_MAX_CHARS);
    context
        .slack_client
        .post_message(&event.channel_id, &text, thread_ts)
        .await
}

/// Handles an event on a detached task and logs what happened.
pub(crate) fn spawn_event_dispatch(context: Arc<SlackRuntimeContext>, event: SlackInboundEvent) {
    tokio::spawn(async move {
        let dedupe_key = event.dedupe_key.clone();
        match handle_inbound_event(&context, event).await {
            Ok(outcome) => {
                tracing::debug!(dedupe_key = %dedupe_key, ?outcome, "slack event handled")
            }
            Err(error) => {
                tracing::warn!(dedupe_key = %dedupe_key, error = %error, "slack event reply failed")
            }
        }
    });
}
