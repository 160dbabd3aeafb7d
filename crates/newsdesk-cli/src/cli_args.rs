use clap::Parser;

use crate::cli_types::{CliPromptTemplate, CliSlackTransport};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "newsdesk",
    about = "Slack assistant for journalists backed by an OpenAI-compatible chat model",
    version
)]
pub struct Cli {
    // Slack credentials and transport.
    #[arg(
        long,
        env = "SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token for the Web API (xoxb-...)"
    )]
    pub slack_bot_token: Option<String>,

    #[arg(
        long,
        env = "SLACK_SIGNING_SECRET",
        hide_env_values = true,
        help = "Slack signing secret used to verify Events API requests (http transport)"
    )]
    pub slack_signing_secret: Option<String>,

    #[arg(
        long,
        env = "SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack app-level token for Socket Mode (xapp-..., socket transport)"
    )]
    pub slack_app_token: Option<String>,

    #[arg(
        long = "slack-transport",
        env = "NEWSDESK_SLACK_TRANSPORT",
        value_enum,
        default_value = "http",
        help = "How Slack delivers events: signed HTTP Events API or Socket Mode"
    )]
    pub slack_transport: CliSlackTransport,

    #[arg(
        long,
        env = "PORT",
        default_value_t = 3000,
        help = "Port for the Slack events endpoint (http transport)"
    )]
    pub port: u16,

    #[arg(
        long,
        env = "NEWSDESK_BIND",
        default_value = "0.0.0.0",
        help = "Address for the Slack events endpoint (http transport)"
    )]
    pub bind: String,

    #[arg(
        long,
        env = "NEWSDESK_SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Base URL for the Slack Web API"
    )]
    pub slack_api_base: String,

    #[arg(
        long,
        env = "NEWSDESK_SLACK_BOT_USER_ID",
        help = "Bot user id used to ignore self-authored events; resolved via auth.test when unset"
    )]
    pub slack_bot_user_id: Option<String>,

    // Conversation behavior.
    #[arg(
        long,
        env = "NEWSDESK_HISTORY_WINDOW",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Maximum number of turns kept per user session"
    )]
    pub history_window: usize,

    #[arg(
        long = "prompt-template",
        env = "NEWSDESK_PROMPT_TEMPLATE",
        value_enum,
        default_value = "brainstorm",
        help = "System prompt template applied to every conversation"
    )]
    pub prompt_template: CliPromptTemplate,

    #[arg(
        long,
        env = "NEWSDESK_MODEL",
        default_value = "gpt-3.5-turbo",
        help = "Chat model name sent to the completion API"
    )]
    pub model: String,

    #[arg(
        long,
        env = "NEWSDESK_TEMPERATURE",
        default_value_t = 0.0,
        help = "Sampling temperature in range 0.0..=2.0"
    )]
    pub temperature: f32,

    #[arg(
        long,
        env = "NEWSDESK_MAX_TOKENS",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Optional cap on completion tokens"
    )]
    pub max_tokens: Option<u32>,

    // Completion provider.
    #[arg(
        long,
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "API key for the OpenAI-compatible completion API"
    )]
    pub openai_api_key: Option<String>,

    #[arg(
        long,
        env = "OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL for the OpenAI-compatible completion API"
    )]
    pub openai_api_base: String,

    #[arg(
        long,
        env = "NEWSDESK_REQUEST_TIMEOUT_MS",
        default_value_t = 60_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for completion and Slack API requests in milliseconds"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        env = "NEWSDESK_COMPLETION_TIMEOUT_MS",
        default_value_t = 90_000,
        value_parser = parse_positive_u64,
        help = "Upper bound on one completion call including provider retries"
    )]
    pub completion_timeout_ms: u64,

    #[arg(
        long,
        env = "NEWSDESK_PROVIDER_MAX_RETRIES",
        default_value_t = 2,
        help = "Maximum retry attempts for retryable completion API failures"
    )]
    pub provider_max_retries: usize,

    #[arg(
        long,
        env = "NEWSDESK_PROVIDER_RETRY_BUDGET_MS",
        default_value_t = 0,
        help = "Optional cumulative retry backoff budget in milliseconds (0 disables budget)"
    )]
    pub provider_retry_budget_ms: u64,

    // Slack delivery tuning.
    #[arg(
        long,
        env = "NEWSDESK_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable Slack Web API failures"
    )]
    pub slack_retry_max_attempts: usize,

    #[arg(
        long,
        env = "NEWSDESK_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base backoff delay for Slack Web API retries in milliseconds"
    )]
    pub slack_retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "NEWSDESK_SLACK_PROCESSED_EVENT_CAP",
        default_value_t = 10_000,
        value_parser = parse_positive_usize,
        help = "Number of recent event keys remembered to skip duplicate deliveries"
    )]
    pub slack_processed_event_cap: usize,

    #[arg(
        long,
        env = "NEWSDESK_SLACK_RECONNECT_DELAY_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Delay before reopening a dropped Socket Mode connection in milliseconds"
    )]
    pub slack_reconnect_delay_ms: u64,
}
