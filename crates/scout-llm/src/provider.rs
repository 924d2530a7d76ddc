use async_trait::async_trait;
use scout_core::{Result, ToolInvocation, ToolSpec, Turn};

/// A request to the inference endpoint. The endpoint is stateless, so every
/// request carries the whole ordered history.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Model tag, e.g. "llama3.1:8b".
    pub model: String,
    /// System prompt, sent ahead of the history.
    pub system: Option<String>,
    /// Conversation history.
    pub messages: Vec<Turn>,
    /// Tools the model may call. Empty for plain completions.
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantResponse {
    /// A final answer. No text and no tool calls is `FinalText("")`.
    FinalText(String),
    /// One or more tool calls, plus any text the model emitted alongside them.
    ToolCallRequest {
        text: String,
        calls: Vec<ToolInvocation>,
    },
}

impl AssistantResponse {
    pub fn text(&self) -> &str {
        match self {
            AssistantResponse::FinalText(text) => text,
            AssistantResponse::ToolCallRequest { text, .. } => text,
        }
    }
}

/// Implemented by each inference backend.
///
/// Errors are `InferenceUnavailable`, `InferenceTimeout` or
/// `InferenceMalformed`. Implementations never retry; the agent loop owns
/// the retry policy.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Human-readable name, e.g. "ollama".
    fn name(&self) -> &str;

    /// Send one non-streaming completion request.
    async fn complete(&self, request: &InferenceRequest) -> Result<AssistantResponse>;

    /// Check if the endpoint is reachable.
    async fn health_check(&self) -> Result<()>;
}
