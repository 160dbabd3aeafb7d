//! Slack transport for the Newsdesk bot.
//!
//! Receives messages, app mentions, and slash commands over the Events API
//! (signed HTTP) or Socket Mode, runs each one through the per-user session
//! store, and posts the model's reply back to Slack.

mod slack_helpers;
pub mod slack_runtime;

pub use slack_runtime::{
    handle_inbound_event, run_slack_runtime, strip_mention_tokens, EventKind,
    PromptTemplateKind, SlackDispatchOutcome, SlackInboundEvent, SlackRuntimeConfig,
    SlackRuntimeContext, SlackSignatureError, SlackTransportMode,
};
