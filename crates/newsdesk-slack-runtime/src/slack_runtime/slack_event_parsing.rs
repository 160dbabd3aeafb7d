//! Normalization of Slack payloads into `SlackInboundEvent`s.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{EventKind, SlackInboundEvent};

static MENTION_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@U[A-Z0-9]+>").expect("mention token pattern"));

/// Removes every `<@U…>` user mention and trims the remainder.
pub fn strip_mention_tokens(text: &str) -> String {
    MENTION_TOKEN_PATTERN
        .replace_all(text, "")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct SlackSocketEnvelope {
    #[serde(default)]
    pub(crate) envelope_id: Option<String>,
    #[serde(rename = "type")]
    pub(crate) envelope_type: String,
    #[serde(default)]
    pub(crate) payload: Value,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackEventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    #[serde(default)]
    event_id: Option<String>,
    event: SlackEventPayload,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Slash command body, shared by the form-encoded HTTP request and the
/// Socket Mode `slash_commands` payload.
pub(crate) struct SlackSlashCommandPayload {
    pub(crate) command: String,
    pub(crate) user_id: String,
    pub(crate) channel_id: String,
    #[serde(default)]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) trigger_id: Option<String>,
}

pub(crate) fn parse_socket_envelope(message: WsMessage) -> Result<Option<SlackSocketEnvelope>> {
    let text = match message {
        WsMessage::Text(text) => text.as_str().to_owned(),
        WsMessage::Binary(bytes) => {
            String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            return Ok(None)
        }
    };
    let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
        .context("failed to parse slack socket envelope")?;
    Ok(Some(envelope))
}

/// Maps an Events API `event_callback` body to an inbound event.
///
/// Returns `None` for callbacks the bot does not answer: other event types,
/// message subtypes (edits, joins, bot posts), and the bot's own messages.
pub(crate) fn normalize_event_callback(
    payload: &Value,
    bot_user_id: &str,
) -> Result<Option<SlackInboundEvent>> {
    let callback = serde_json::from_value::<SlackEventCallbackEnvelope>(payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(None);
    }

    let event = callback.event;
    if event.subtype.is_some() || event.bot_id.is_some() {
        return Ok(None);
    }
    let user_id = match event.user {
        Some(user) if !user.trim().is_empty() => user,
        _ => return Ok(None),
    };
    if user_id == bot_user_id {
        return Ok(None);
    }
    let channel_id = match event.channel {
        Some(channel) if !channel.trim().is_empty() => channel,
        _ => return Ok(None),
    };
    let ts = match event.ts {
        Some(ts) if !ts.trim().is_empty() => ts,
        _ => return Ok(None),
    };

    let kind = match event.event_type.as_str() {
        "app_mention" => EventKind::Mention {
            thread_ts: ts.clone(),
        },
        "message" => EventKind::Message,
        _ => return Ok(None),
    };

    let dedupe_key = callback
        .event_id
        .filter(|event_id| !event_id.trim().is_empty())
        .unwrap_or_else(|| format!("{channel_id}:{ts}"));

    Ok(Some(SlackInboundEvent {
        dedupe_key,
        kind,
        user_id,
        channel_id,
        text: event.text.unwrap_or_default(),
        ts,
    }))
}

/// Maps a slash command to an inbound event keyed by `fallback_key` when the
/// payload carries no trigger id.
pub(crate) fn normalize_slash_command(
    command: SlackSlashCommandPayload,
    fallback_key: &str,
) -> Option<SlackInboundEvent> {
    if command.user_id.trim().is_empty() || command.channel_id.trim().is_empty() {
        return None;
    }
    let dedupe_key = command
        .trigger_id
        .filter(|trigger_id| !trigger_id.trim().is_empty())
        .map(|trigger_id| format!("command:{trigger_id}"))
        .unwrap_or_else(|| format!("command:{fallback_key}"));
    Some(SlackInboundEvent {
        dedupe_key,
        kind: EventKind::Command {
            name: command.command,
        },
        user_id: command.user_id,
        channel_id: command.channel_id,
        text: command.text,
        ts: String::new(),
    })
}

/// Maps a Socket Mode envelope to an inbound event.
pub(crate) fn normalize_socket_envelope(
    envelope: &SlackSocketEnvelope,
    bot_user_id: &str,
) -> Result<Option<SlackInboundEvent>> {
    match envelope.envelope_type.as_str() {
        "events_api" => normalize_event_callback(&envelope.payload, bot_user_id),
        "slash_commands" => {
            let command =
                serde_json::from_value::<SlackSlashCommandPayload>(envelope.payload.clone())
                    .context("failed to decode slack slash command payload")?;
            let fallback_key = envelope.envelope_id.clone().unwrap_or_default();
            Ok(normalize_slash_command(command, &fallback_key))
        }
        _ => Ok(None),
    }
}
