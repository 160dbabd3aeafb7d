mod bootstrap_helpers;
mod cli_args;
mod cli_types;
mod startup_config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use newsdesk_ai::{LlmClient, OpenAiClient};
use newsdesk_slack_runtime::run_slack_runtime;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::startup_config::{build_openai_config, build_runtime_config, validate_cli};

async fn run_cli(cli: Cli) -> Result<()> {
    validate_cli(&cli)?;
    let openai_config = build_openai_config(&cli)?;
    let llm_client: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(openai_config).context("failed to create completion client")?,
    );
    let runtime_config = build_runtime_config(&cli, llm_client)?;
    run_slack_runtime(runtime_config).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
