//! Mock inference client for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use scout_core::{Result, ScoutError, ToolInvocation};

/// Which inference error a queued failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Timeout,
    Malformed,
}

/// A pre-configured reply from the mock client.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply(AssistantResponse),
    Fail(MockFailure, String),
}

impl MockResponse {
    /// Create a text response.
    pub fn text(text: &str) -> Self {
        MockResponse::Reply(AssistantResponse::FinalText(text.to_string()))
    }

    /// Create an error response.
    pub fn error(kind: MockFailure, msg: &str) -> Self {
        MockResponse::Fail(kind, msg.to_string())
    }
}

/// An inference client that replays queued responses in order.
///
/// # Example
/// ```
/// use scout_llm::mock::MockInference;
/// let client = MockInference::new()
///     .with_tool_call("stock_snapshot", serde_json::json!({"symbol": "AAPL"}))
///     .with_response("AAPL implied volatility is rising.");
/// ```
#[derive(Default)]
pub struct MockInference {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Every request received, for assertions in tests.
    requests: Arc<Mutex<Vec<InferenceRequest>>>,
    latency: Option<Duration>,
    healthy: bool,
}

impl MockInference {
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Queue a final text response.
    pub fn with_response(self, text: &str) -> Self {
        self.push(MockResponse::text(text))
    }

    /// Queue a response with a single tool call.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.with_tool_calls(vec![(name, args)])
    }

    /// Queue a response requesting several tool calls at once.
    pub fn with_tool_calls(self, calls: Vec<(&str, serde_json::Value)>) -> Self {
        let calls = calls
            .into_iter()
            .map(|(name, arguments)| ToolInvocation {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                tool_name: name.to_string(),
                arguments,
            })
            .collect();
        self.push(MockResponse::Reply(AssistantResponse::ToolCallRequest {
            text: String::new(),
            calls,
        }))
    }

    /// Queue an error response.
    pub fn with_error(self, kind: MockFailure, msg: &str) -> Self {
        self.push(MockResponse::error(kind, msg))
    }

    /// Delay every call, to hold a conversation busy in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `health_check` fail.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Queue a response after construction.
    pub fn queue(&self, resp: MockResponse) {
        self.responses.lock().push_back(resp);
    }

    fn push(self, resp: MockResponse) -> Self {
        self.queue(resp);
        self
    }

    /// All requests made to this client so far.
    pub fn recorded_requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    /// Pop the next queued response, or a "no response queued" message.
    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"))
    }
}

#[async_trait]
impl InferenceClient for MockInference {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<AssistantResponse> {
        self.requests.lock().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_response() {
            MockResponse::Reply(reply) => Ok(reply),
            MockResponse::Fail(MockFailure::Unavailable, msg) => Err(ScoutError::InferenceUnavailable(msg)),
            MockResponse::Fail(MockFailure::Timeout, msg) => Err(ScoutError::InferenceTimeout(msg)),
            MockResponse::Fail(MockFailure::Malformed, msg) => Err(ScoutError::InferenceMalformed(msg)),
        }
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(ScoutError::InferenceUnavailable("mock marked unhealthy".into()))
        }
    }
}
