use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use newsdesk_ai::{LlmClient, OpenAiConfig};
use newsdesk_slack_runtime::{SlackRuntimeConfig, SlackTransportMode};

use crate::cli_args::Cli;

const MAX_TEMPERATURE: f32 = 2.0;

fn required_secret(value: Option<&str>, flag: &str, env: &str) -> Result<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("--{flag} (or {env}) is required"))
}

/// Rejects flag combinations that cannot start a working bot.
pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
    if cli.history_window == 0 {
        bail!("--history-window must be greater than 0");
    }
    if !cli.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&cli.temperature) {
        bail!(
            "--temperature must be within 0.0..={MAX_TEMPERATURE}, got {}",
            cli.temperature
        );
    }
    if cli.model.trim().is_empty() {
        bail!("--model cannot be empty");
    }
    required_secret(cli.slack_bot_token.as_deref(), "slack-bot-token", "SLACK_BOT_TOKEN")?;
    required_secret(cli.openai_api_key.as_deref(), "openai-api-key", "OPENAI_API_KEY")?;
    match SlackTransportMode::from(cli.slack_transport) {
        SlackTransportMode::Http => {
            required_secret(
                cli.slack_signing_secret.as_deref(),
                "slack-signing-secret",
                "SLACK_SIGNING_SECRET",
            )?;
        }
        SlackTransportMode::Socket => {
            required_secret(
                cli.slack_app_token.as_deref(),
                "slack-app-token",
                "SLACK_APP_TOKEN",
            )?;
        }
    }
    Ok(())
}

pub(crate) fn build_openai_config(cli: &Cli) -> Result<OpenAiConfig> {
    Ok(OpenAiConfig {
        api_base: cli.openai_api_base.trim().to_string(),
        api_key: required_secret(cli.openai_api_key.as_deref(), "openai-api-key", "OPENAI_API_KEY")?,
        organization: None,
        request_timeout_ms: cli.request_timeout_ms,
        max_retries: cli.provider_max_retries,
        retry_budget_ms: cli.provider_retry_budget_ms,
        retry_jitter: true,
    })
}

pub(crate) fn build_runtime_config(
    cli: &Cli,
    llm_client: Arc<dyn LlmClient>,
) -> Result<SlackRuntimeConfig> {
    let secret = |value: Option<&String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    Ok(SlackRuntimeConfig {
        llm_client,
        transport: cli.slack_transport.into(),
        api_base: cli.slack_api_base.trim().to_string(),
        bot_token: required_secret(
            cli.slack_bot_token.as_deref(),
            "slack-bot-token",
            "SLACK_BOT_TOKEN",
        )?,
        app_token: secret(cli.slack_app_token.as_ref()),
        signing_secret: secret(cli.slack_signing_secret.as_ref()),
        bot_user_id: secret(cli.slack_bot_user_id.as_ref()),
        bind: format!("{}:{}", cli.bind.trim(), cli.port),
        history_window: cli.history_window,
        prompt_template: cli.prompt_template.into(),
        model: cli.model.trim().to_string(),
        temperature: cli.temperature,
        max_tokens: cli.max_tokens,
        completion_timeout_ms: cli.completion_timeout_ms,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.slack_retry_max_attempts,
        retry_base_delay_ms: cli.slack_retry_base_delay_ms,
        processed_event_cap: cli.slack_processed_event_cap,
        reconnect_delay: Duration::from_millis(cli.slack_reconnect_delay_ms),
    })
}
