use std::time::{Duration, Instant};

use async_trait::async_trait;
use newsdesk_core::elapsed_ms_since;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::{
    retry::{
        is_retryable_status, is_retryable_transport_error, new_request_id, retry_after_ms,
        RetryPolicy,
    },
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, NewsdeskAiError,
};

#[derive(Debug, Clone)]
/// Connection settings for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            organization: None,
            request_timeout_ms: 60_000,
            max_retries: 2,
            retry_budget_ms: 0,
            retry_jitter: true,
        }
    }
}

#[derive(Debug, Clone)]
/// `LlmClient` backed by `POST {api_base}/chat/completions`.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, NewsdeskAiError> {
        if config.api_key.trim().is_empty() {
            return Err(NewsdeskAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                NewsdeskAiError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );
        if let Some(org) = config.organization.as_deref().map(str::trim) {
            if !org.is_empty() {
                headers.insert(
                    "OpenAI-Organization",
                    HeaderValue::from_str(org).map_err(|e| {
                        NewsdeskAiError::InvalidResponse(format!("invalid organization header: {e}"))
                    })?,
                );
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            budget_ms: self.config.retry_budget_ms,
            jitter: self.config.retry_jitter,
        }
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, NewsdeskAiError> {
        let body = build_chat_request_body(&request);
        let url = self.chat_completions_url();
        let policy = self.retry_policy();
        let started = Instant::now();
        let mut attempt = 0_usize;

        loop {
            let request_id = new_request_id();
            let sent = self
                .client
                .post(&url)
                .header("x-newsdesk-request-id", request_id.as_str())
                .header("x-newsdesk-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;

            let (delay, failure) = match sent {
                Ok(response) if response.status().is_success() => {
                    let raw = response.text().await?;
                    return parse_chat_response(&raw);
                }
                Ok(response) => {
                    let status = response.status();
                    let retry_after = retry_after_ms(response.headers());
                    let raw = response.text().await?;
                    let delay = if is_retryable_status(status) {
                        policy.next_delay(attempt, elapsed_ms_since(started), retry_after)
                    } else {
                        None
                    };
                    let failure = NewsdeskAiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    };
                    (delay, failure)
                }
                Err(error) => {
                    let delay = if is_retryable_transport_error(&error) {
                        policy.next_delay(attempt, elapsed_ms_since(started), None)
                    } else {
                        None
                    };
                    (delay, NewsdeskAiError::Http(error))
                }
            };

            let Some(delay) = delay else {
                return Err(failure);
            };
            tracing::debug!(
                request_id = %request_id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "retrying chat completion"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect::<Vec<_>>();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, NewsdeskAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        NewsdeskAiError::InvalidResponse("response contained no choices".to_string())
    })?;

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    let text = flatten_openai_content(choice.message.content.as_ref());
    if text.trim().is_empty() {
        return Err(NewsdeskAiError::InvalidResponse(format!(
            "empty completion (finish_reason: {})",
            choice.finish_reason.as_deref().unwrap_or("none")
        )));
    }

    Ok(ChatResponse {
        message: Message::new(MessageRole::Assistant, text),
        finish_reason: choice.finish_reason,
        usage,
    })
}

fn flatten_openai_content(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                let kind = part.get("type").and_then(Value::as_str).unwrap_or("text");
                if matches!(kind, "text" | "output_text") {
                    part.get("text").and_then(Value::as_str)
                } else {
                    None
                }
            })
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{build_chat_request_body, parse_chat_response, OpenAiClient, OpenAiConfig};
    use crate::{ChatRequest, LlmClient, Message, MessageRole, NewsdeskAiError};

    fn test_config(api_base: String) -> OpenAiConfig {
        OpenAiConfig {
            api_base,
            api_key: "sk-test".to_string(),
            organization: None,
            request_timeout_ms: 3_000,
            max_retries: 2,
            retry_budget_ms: 0,
            retry_jitter: false,
        }
    }

    fn sample_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![
                Message::system("You are a newsroom assistant."),
                Message::user("pitch me a story"),
                Message::assistant_text("Try local housing."),
                Message::user("another angle?"),
            ],
            max_tokens: Some(256),
            temperature: Some(0.0),
        }
    }

    #[test]
    fn unit_request_body_preserves_message_order_and_sampling_fields() {
        let body = build_chat_request_body(&sample_request());
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(body["messages"][3]["content"], "another angle?");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn unit_request_body_omits_unset_sampling_fields() {
        let mut request = sample_request();
        request.max_tokens = None;
        request.temperature = None;
        let body = build_chat_request_body(&request);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn functional_parse_chat_response_reads_text_and_usage() {
        let raw = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Here are three angles."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        })
        .to_string();

        let parsed = parse_chat_response(&raw).expect("parse response");
        assert_eq!(parsed.message.role, MessageRole::Assistant);
        assert_eq!(parsed.message.text_content(), "Here are three angles.");
        assert_eq!(parsed.finish_reason.as_deref(), Some("stop"));
        assert_eq!(parsed.usage.total_tokens, 17);
    }

    #[test]
    fn functional_parse_chat_response_joins_text_parts() {
        let raw = json!({
            "choices": [{
                "message": {"content": [
                    {"type": "text", "text": "first"},
                    {"type": "image_url", "image_url": {"url": "https://example.test/x.png"}},
                    {"type": "text", "text": "second"}
                ]},
                "finish_reason": null
            }]
        })
        .to_string();

        let parsed = parse_chat_response(&raw).expect("parse response");
        assert_eq!(parsed.message.text_content(), "first\nsecond");
        assert_eq!(parsed.usage.total_tokens, 0);
    }

    #[test]
    fn regression_parse_chat_response_rejects_empty_choices() {
        let error = parse_chat_response(r#"{"choices":[]}"#).expect_err("no choices");
        assert!(matches!(error, NewsdeskAiError::InvalidResponse(_)));
    }

    #[test]
    fn regression_parse_chat_response_rejects_blank_content() {
        for content in [json!(null), json!(""), json!("  \n"), json!([])] {
            let raw = json!({
                "choices": [{
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "content_filter"
                }]
            })
            .to_string();
            match parse_chat_response(&raw) {
                Err(NewsdeskAiError::InvalidResponse(message)) => {
                    assert!(message.contains("content_filter"), "{message}");
                }
                other => panic!("expected blank completion error, got {other:?}"),
            }
        }
    }

    #[test]
    fn unit_new_rejects_blank_api_key() {
        let mut config = test_config("http://localhost".to_string());
        config.api_key = "   ".to_string();
        assert!(matches!(
            OpenAiClient::new(config),
            Err(NewsdeskAiError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn integration_complete_posts_to_chat_completions_with_bearer_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "pitch ready"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            }));
        });

        let client = OpenAiClient::new(test_config(format!("{}/v1", server.base_url())))
            .expect("client");
        let response = client.complete(sample_request()).await.expect("complete");
        assert_eq!(response.message.text_content(), "pitch ready");
        mock.assert();
    }

    #[tokio::test]
    async fn integration_complete_retries_rate_limited_attempt() {
        let server = MockServer::start();
        let limited = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("x-newsdesk-retry-attempt", "0");
            then.status(429).body("slow down");
        });
        let succeeded = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("x-newsdesk-retry-attempt", "1");
            then.status(200).json_body(json!({
                "choices": [{"message": {"content": "after retry"}, "finish_reason": "stop"}]
            }));
        });

        let client = OpenAiClient::new(test_config(format!("{}/v1", server.base_url())))
            .expect("client");
        let response = client.complete(sample_request()).await.expect("complete");
        assert_eq!(response.message.text_content(), "after retry");
        limited.assert_calls(1);
        succeeded.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_complete_does_not_retry_auth_failures() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).body("invalid key");
        });

        let client = OpenAiClient::new(test_config(format!("{}/v1", server.base_url())))
            .expect("client");
        let error = client
            .complete(sample_request())
            .await
            .expect_err("auth failure");
        match error {
            NewsdeskAiError::HttpStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid key");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_calls(1);
    }
}
