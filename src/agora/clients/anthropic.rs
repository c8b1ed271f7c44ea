//! Anthropic Messages API client with streaming extended thinking.
//!
//! Implements [`LlmClient`] over the native `/v1/messages` endpoint:
//! requests stream as server-sent events, thinking and text deltas are
//! surfaced incrementally, and the final usage report carries the
//! provider's token accounting. Quota/billing failures are classified so
//! the agent loop can treat them as a hard stop.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::clients::anthropic::{AnthropicClient, Model};
//! use agora::llm_client::{CompletionRequest, LlmClient};
//! use futures_util::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AnthropicClient::new_with_model_enum(
//!     &std::env::var("ANTHROPIC_API_KEY")?,
//!     Model::ClaudeSonnet4,
//! );
//! let mut stream = client
//!     .stream_completion(CompletionRequest {
//!         prompt: "Say hello in one sentence.".to_string(),
//!         max_tokens: 2100,
//!         thinking_budget: 2000,
//!     })
//!     .await?;
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::agora::llm_client::{
    CompletionRequest, CompletionStream, LlmClient, LlmError, LlmTokenUsage, StreamEvent,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;

/// API version header required by the Messages endpoint.
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

lazy_static! {
    /// Shared pooled HTTP client; avoids per-request DNS/TLS churn across
    /// many concurrently streaming agents.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");
}

/// Claude models commonly used for conversation simulation.
pub enum Model {
    /// `claude-sonnet-4-20250514` – balanced reasoning and throughput.
    ClaudeSonnet4,
    /// `claude-opus-4-0` – most capable tier.
    ClaudeOpus4,
    /// `claude-3-7-sonnet-latest` – previous Sonnet generation.
    ClaudeSonnet37,
    /// `claude-3-5-haiku-latest` – fastest tier.
    ClaudeHaiku35,
}

/// Convert a [`Model`] variant into the identifier expected by the API.
fn model_to_string(model: Model) -> String {
    match model {
        Model::ClaudeSonnet4 => "claude-sonnet-4-20250514".to_string(),
        Model::ClaudeOpus4 => "claude-opus-4-0".to_string(),
        Model::ClaudeSonnet37 => "claude-3-7-sonnet-latest".to_string(),
        Model::ClaudeHaiku35 => "claude-3-5-haiku-latest".to_string(),
    }
}

/// Client for Anthropic's Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a client from an API key and explicit model string.
    pub fn new(api_key: &str, model: &str) -> Self {
        AnthropicClient {
            client: SHARED_HTTP_CLIENT.clone(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create a client from an API key and strongly typed model variant.
    pub fn new_with_model_enum(api_key: &str, model: Model) -> Self {
        Self::new(api_key, &model_to_string(model))
    }

    /// Create a client pointing at a custom Anthropic-compatible base URL.
    pub fn new_with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        AnthropicClient {
            client: SHARED_HTTP_CLIENT.clone(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Construct from `ANTHROPIC_API_KEY` (required), `ANTHROPIC_MODEL`
    /// and `ANTHROPIC_BASE_URL` (optional).
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LlmError::Service("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        let model = std::env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| model_to_string(Model::ClaudeSonnet4));
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new_with_base_url(&api_key, &model, &base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: usize,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingParam>,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ThinkingParam {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: usize,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// One decoded SSE frame. Fields are optional because each event type
/// populates a different subset.
#[derive(Deserialize)]
struct SsePayload {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<SseDelta>,
    message: Option<SseMessageStart>,
    usage: Option<SseOutputUsage>,
}

#[derive(Deserialize)]
struct SseDelta {
    thinking: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct SseMessageStart {
    usage: Option<SseInputUsage>,
}

#[derive(Deserialize)]
struct SseInputUsage {
    input_tokens: usize,
}

#[derive(Deserialize)]
struct SseOutputUsage {
    output_tokens: usize,
}

/// Decode one SSE data frame into at most one [`StreamEvent`], tracking
/// the input-token count reported by `message_start` so the final usage
/// event is complete.
fn decode_frame(data: &str, input_tokens: &mut usize) -> Option<StreamEvent> {
    let payload: SsePayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        // Unknown or malformed frames (pings, new event kinds) are skipped.
        Err(_) => return None,
    };
    match payload.kind.as_str() {
        "message_start" => {
            if let Some(usage) = payload.message.and_then(|m| m.usage) {
                *input_tokens = usage.input_tokens;
            }
            None
        }
        "content_block_delta" => {
            let delta = payload.delta?;
            if let Some(thinking) = delta.thinking {
                Some(StreamEvent::Thinking(thinking))
            } else {
                delta.text.map(StreamEvent::Text)
            }
        }
        "message_delta" => payload.usage.map(|usage| {
            StreamEvent::Usage(LlmTokenUsage {
                input_tokens: *input_tokens,
                output_tokens: usage.output_tokens,
            })
        }),
        _ => None,
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError> {
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            stream: true,
            thinking: if request.thinking_budget > 0 {
                Some(ThinkingParam {
                    kind: "enabled",
                    budget_tokens: request.thinking_budget,
                })
            } else {
                None
            },
            messages: vec![ApiMessage {
                role: "user",
                content: request.prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Service(format!("request failed: {}", err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!(
                "agora::clients::anthropic::stream_completion(...): API error ({}): {}",
                status,
                text
            );
            let message = match serde_json::from_str::<ApiError>(&text) {
                Ok(parsed) => parsed.error.message,
                Err(_) => format!("{}: {}", status, text),
            };
            return Err(LlmError::from_provider(message));
        }

        let bytes_stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
        });
        let reader = tokio::io::BufReader::new(tokio_util::io::StreamReader::new(bytes_stream));
        let lines = LinesStream::new(reader.lines());

        let events = lines
            .scan(0usize, |input_tokens, line_result| {
                let out: Option<Result<StreamEvent, LlmError>> = match line_result {
                    Ok(line) => match line.strip_prefix("data: ") {
                        Some(data) => decode_frame(data, input_tokens).map(Ok),
                        None => None,
                    },
                    Err(err) => Some(Err(LlmError::Service(format!(
                        "stream read error: {}",
                        err
                    )))),
                };
                futures_util::future::ready(Some(out))
            })
            .filter_map(futures_util::future::ready);

        Ok(Box::pin(events))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_keeps_model_and_default_base_url() {
        let client = AnthropicClient::new("key", "claude-sonnet-4-20250514");
        assert_eq!(client.model_name(), "claude-sonnet-4-20250514");
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn custom_base_url_is_trimmed() {
        let client =
            AnthropicClient::new_with_base_url("key", "claude-opus-4-0", "https://proxy.local/v1/");
        assert_eq!(client.base_url(), "https://proxy.local/v1");
    }

    #[test]
    fn decode_thinking_and_text_deltas() {
        let mut input_tokens = 0;
        let event = decode_frame(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            &mut input_tokens,
        );
        assert!(matches!(event, Some(StreamEvent::Thinking(t)) if t == "hmm"));

        let event = decode_frame(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hello"}}"#,
            &mut input_tokens,
        );
        assert!(matches!(event, Some(StreamEvent::Text(t)) if t == "hello"));
    }

    #[test]
    fn decode_usage_combines_message_start_input_tokens() {
        let mut input_tokens = 0;
        let event = decode_frame(
            r#"{"type":"message_start","message":{"usage":{"input_tokens":321}}}"#,
            &mut input_tokens,
        );
        assert!(event.is_none());
        assert_eq!(input_tokens, 321);

        let event = decode_frame(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":45}}"#,
            &mut input_tokens,
        );
        match event {
            Some(StreamEvent::Usage(usage)) => {
                assert_eq!(usage.input_tokens, 321);
                assert_eq!(usage.output_tokens, 45);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let mut input_tokens = 0;
        assert!(decode_frame("not json", &mut input_tokens).is_none());
        assert!(decode_frame(r#"{"type":"ping"}"#, &mut input_tokens).is_none());
    }
}
