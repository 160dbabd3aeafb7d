//! Completion client surface for Newsdesk.
//!
//! Exposes the `LlmClient` trait the conversation layer talks to, the chat
//! request/response types, and an OpenAI-compatible chat-completions client.
mod openai;
mod retry;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, NewsdeskAiError,
};
