//! The LLM provider boundary.
//!
//! A [`LlmClient`] wraps one remote model behind a single streaming call:
//! given a prompt, a response token budget and an extended-thinking budget,
//! it yields incremental thinking text, incremental response text, and a
//! final usage report. The response generator consumes the stream; it never
//! sees HTTP.
//!
//! Provider failures surface as [`LlmError`], which distinguishes
//! quota/billing exhaustion (conversation-fatal; the spend limit is a hard
//! stop) from transient service errors (retried with backoff). The
//! classification is a substring match on the provider's error message,
//! which is how the upstream APIs actually signal it.

use async_trait::async_trait;
use futures_util::Stream;
use std::error::Error;
use std::fmt;
use std::pin::Pin;

/// One streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully assembled prompt (persona, history, instructions).
    pub prompt: String,
    /// Token budget for the visible response.
    pub max_tokens: usize,
    /// Token budget for extended thinking. Zero disables thinking.
    pub thinking_budget: usize,
}

/// Incremental output from a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of the model's intermediate reasoning.
    Thinking(String),
    /// A fragment of the final response text.
    Text(String),
    /// The provider's usage report, sent once near the end of the stream.
    Usage(LlmTokenUsage),
}

/// Token counts reported by the provider for one completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmTokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Boxed stream of completion events.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Error from an LLM provider call.
#[derive(Debug, Clone)]
pub enum LlmError {
    /// Credit/billing exhaustion. Not retried; external intervention is
    /// required.
    Quota(String),
    /// Anything else: network failures, model errors, malformed responses.
    Service(String),
}

impl LlmError {
    /// Classify a raw provider error message. Quota/billing failures are
    /// recognized by the phrases the provider puts in them.
    pub fn from_provider(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("credit balance") || lowered.contains("billing") {
            LlmError::Quota(message)
        } else {
            LlmError::Service(message)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, LlmError::Quota(_))
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Quota(msg) => write!(f, "LLM quota error: {}", msg),
            LlmError::Service(msg) => write!(f, "LLM service error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// Interface to a streaming LLM backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streaming completion. The returned stream yields
    /// [`StreamEvent`]s until the response is complete; the final
    /// [`StreamEvent::Usage`] carries the provider's token accounting.
    async fn stream_completion(&self, request: CompletionRequest)
        -> Result<CompletionStream, LlmError>;

    /// Identifier of the underlying model, for logging.
    fn model_name(&self) -> &str;
}
