//! # scout-llm
//!
//! Abstraction over the inference endpoint. One request carries the full
//! conversation history plus tool declarations; one response is either final
//! text or a batch of tool calls.

pub mod provider;
pub mod ollama;
pub mod mock;

pub use provider::{AssistantResponse, InferenceClient, InferenceRequest};
pub use ollama::OllamaClient;
pub use mock::MockInference;
