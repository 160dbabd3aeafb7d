//! Socket Mode ingress: websocket read loop with per-envelope acks.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::slack_event_parsing::{
    normalize_socket_envelope, parse_socket_envelope, SlackSocketEnvelope,
};
use super::{spawn_event_dispatch, SlackRuntimeContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketSessionEnd {
    /// Slack closed the socket or sent a `disconnect` envelope.
    Disconnected,
    ShutdownRequested,
}

pub(crate) async fn run_socket_ingress(
    context: Arc<SlackRuntimeContext>,
    reconnect_delay: Duration,
) -> Result<()> {
    let mut failure_streak = 0_usize;
    loop {
        match context.slack_client.open_socket_connection().await {
            Ok(socket_url) => {
                tracing::info!("slack socket mode connected");
                match run_socket_session(Arc::clone(&context), &socket_url).await {
                    Ok(SocketSessionEnd::ShutdownRequested) => {
                        tracing::info!("slack socket mode shutdown requested");
                        return Ok(());
                    }
                    Ok(SocketSessionEnd::Disconnected) => {
                        failure_streak = 0;
                        tracing::info!("slack socket mode disconnected; reconnecting");
                    }
                    Err(error) => {
                        failure_streak = failure_streak.saturating_add(1);
                        tracing::warn!(failure_streak, error = %error, "slack socket session error");
                    }
                }
            }
            Err(error) => {
                failure_streak = failure_streak.saturating_add(1);
                tracing::warn!(
                    failure_streak,
                    error = %error,
                    "failed to open slack socket connection"
                );
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("slack socket mode shutdown requested");
                return Ok(());
            }
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

pub(crate) async fn run_socket_session(
    context: Arc<SlackRuntimeContext>,
    socket_url: &str,
) -> Result<SocketSessionEnd> {
    let (stream, _response) = connect_async(socket_url)
        .await
        .context("failed to connect slack socket mode websocket")?;
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(SocketSessionEnd::ShutdownRequested);
            }
            maybe_message = source.next() => {
                let Some(message_result) = maybe_message else {
                    return Ok(SocketSessionEnd::Disconnected);
                };
                let message = message_result.context("failed reading slack websocket message")?;
                if matches!(message, WsMessage::Close(_)) {
                    return Ok(SocketSessionEnd::Disconnected);
                }
                let Some(envelope) = parse_socket_envelope(message)? else {
                    continue;
                };
                if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                    ack_envelope(&mut sink, envelope_id).await?;
                }
                if !handle_envelope(&context, &envelope) {
                    return Ok(SocketSessionEnd::Disconnected);
                }
            }
        }
    }
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("failed to send slack socket ack")
}

/// Returns `false` when Slack asks the client to reconnect.
fn handle_envelope(context: &Arc<SlackRuntimeContext>, envelope: &SlackSocketEnvelope) -> bool {
    match envelope.envelope_type.as_str() {
        "hello" => {
            tracing::debug!("slack socket mode hello received");
            true
        }
        "disconnect" => {
            tracing::info!(
                reason = envelope.reason.as_deref().unwrap_or("unspecified"),
                "slack socket mode disconnect requested"
            );
            false
        }
        _ => {
            match normalize_socket_envelope(envelope, context.bot_user_id()) {
                Ok(Some(event)) => spawn_event_dispatch(Arc::clone(context), event),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        envelope_type = %envelope.envelope_type,
                        error = %error,
                        "malformed slack socket envelope"
                    );
                }
            }
            true
        }
    }
}
