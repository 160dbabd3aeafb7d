//! Events API ingress: signed `POST /slack/events` plus `GET /healthz`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use newsdesk_core::current_unix_timestamp;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::slack_event_parsing::{
    normalize_event_callback, normalize_slash_command, SlackSlashCommandPayload,
};
use super::slack_signature::{
    verify_slack_v0_signature, SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER,
};
use super::{spawn_event_dispatch, SlackRuntimeContext};

pub(crate) struct SlackHttpIngressState {
    pub(crate) context: Arc<SlackRuntimeContext>,
    pub(crate) signing_secret: String,
}

pub(crate) async fn run_http_ingress(
    context: Arc<SlackRuntimeContext>,
    bind: &str,
    signing_secret: String,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve slack events bound address")?;
    tracing::info!(addr = %local_addr, "slack events endpoint listening");

    let app = build_slack_events_router(Arc::new(SlackHttpIngressState {
        context,
        signing_secret,
    }));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("slack events endpoint shutdown requested");
        })
        .await
        .context("slack events server exited unexpectedly")
}

pub(crate) fn build_slack_events_router(state: Arc<SlackHttpIngressState>) -> Router {
    Router::new()
        .route("/slack/events", post(handle_slack_events))
        .route("/healthz", get(handle_health))
        .with_state(state)
}

async fn handle_health(State(state): State<Arc<SlackHttpIngressState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "transport": "http",
            "sessions": state.context.sessions().session_count(),
            "processed_events": state.context.processed_event_count(),
        })),
    )
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

async fn handle_slack_events(
    State(state): State<Arc<SlackHttpIngressState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let signature = header(SLACK_SIGNATURE_HEADER);
    let timestamp = header(SLACK_TIMESTAMP_HEADER);
    if let Err(error) = verify_slack_v0_signature(
        &body,
        &signature,
        &timestamp,
        &state.signing_secret,
        current_unix_timestamp(),
    ) {
        tracing::warn!(error = %error, "rejecting unsigned slack request");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "slack request signature verification failed",
        );
    }

    let is_form = header(CONTENT_TYPE.as_str())
        .to_ascii_lowercase()
        .starts_with("application/x-www-form-urlencoded");
    if is_form {
        return accept_slash_command(&state, body, &timestamp, &signature).await;
    }

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(error = %error, "invalid slack events payload");
            return error_response(
                StatusCode::BAD_REQUEST,
                "parse_failed",
                "invalid slack events payload",
            );
        }
    };

    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = payload
                .get("challenge")
                .and_then(Value::as_str)
                .unwrap_or_default();
            (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
        }
        Some("event_callback") => {
            match normalize_event_callback(&payload, state.context.bot_user_id()) {
                Ok(Some(event)) => {
                    let dedupe_key = event.dedupe_key.clone();
                    spawn_event_dispatch(Arc::clone(&state.context), event);
                    (
                        StatusCode::OK,
                        Json(json!({"status": "accepted", "event_key": dedupe_key})),
                    )
                        .into_response()
                }
                Ok(None) => (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response(),
                Err(error) => {
                    tracing::warn!(error = %error, "malformed slack event callback");
                    error_response(
                        StatusCode::BAD_REQUEST,
                        "parse_failed",
                        "malformed slack event callback",
                    )
                }
            }
        }
        _ => (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response(),
    }
}

async fn accept_slash_command(
    state: &SlackHttpIngressState,
    body: Bytes,
    timestamp: &str,
    signature: &str,
) -> Response {
    let request = match Request::builder()
        .method("POST")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
    {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(error = %error, "failed to rebuild slash command request");
            return error_response(
                StatusCode::BAD_REQUEST,
                "parse_failed",
                "invalid slash command payload",
            );
        }
    };
    let command = match Form::<SlackSlashCommandPayload>::from_request(request, &()).await {
        Ok(Form(command)) => command,
        Err(error) => {
            tracing::warn!(error = %error, "invalid slash command payload");
            return error_response(
                StatusCode::BAD_REQUEST,
                "parse_failed",
                "invalid slash command payload",
            );
        }
    };

    let fallback_key = format!("{timestamp}:{signature}");
    match normalize_slash_command(command, &fallback_key) {
        Some(event) => {
            spawn_event_dispatch(Arc::clone(&state.context), event);
            // An empty 200 body acknowledges the command without echoing into the channel.
            StatusCode::OK.into_response()
        }
        None => error_response(
            StatusCode::BAD_REQUEST,
            "parse_failed",
            "slash command is missing user or channel",
        ),
    }
}
