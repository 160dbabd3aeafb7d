use clap::ValueEnum;

use newsdesk_slack_runtime::{PromptTemplateKind, SlackTransportMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliSlackTransport {
    Http,
    Socket,
}

impl From<CliSlackTransport> for SlackTransportMode {
    fn from(value: CliSlackTransport) -> Self {
        match value {
            CliSlackTransport::Http => SlackTransportMode::Http,
            CliSlackTransport::Socket => SlackTransportMode::Socket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliPromptTemplate {
    Brainstorm,
    General,
}

impl From<CliPromptTemplate> for PromptTemplateKind {
    fn from(value: CliPromptTemplate) -> Self {
        match value {
            CliPromptTemplate::Brainstorm => PromptTemplateKind::Brainstorm,
            CliPromptTemplate::General => PromptTemplateKind::General,
        }
    }
}
