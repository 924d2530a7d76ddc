use async_trait::async_trait;
use scout_core::{Result, Role, ScoutError, ToolInvocation, ToolSpec, Turn};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::provider::*;

/// Ollama `/api/chat` client with native tool calling.
pub struct OllamaClient {
    client: reqwest::Client,
    /// Address of the Ollama server (e.g. "http://127.0.0.1:11434")
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Default local Ollama instance.
    pub fn local() -> Self {
        Self::new("http://127.0.0.1:11434", Duration::from_secs(300))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ScoutError {
        if e.is_timeout() {
            ScoutError::InferenceTimeout(format!("no response within {}s", self.timeout.as_secs()))
        } else if e.is_decode() {
            ScoutError::InferenceMalformed(e.to_string())
        } else {
            ScoutError::InferenceUnavailable(format!("{}: {e}", self.base_url))
        }
    }
}

/// Build the `/api/chat` body.
pub(crate) fn request_body(request: &InferenceRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(ref system) = request.system {
        messages.push(json!({
            "role": "system",
            "content": system,
        }));
    }

    for turn in &request.messages {
        messages.push(turn_to_message(turn));
    }

    let mut body = json!({
        "model": &request.model,
        "messages": messages,
        "stream": false,
        "options": {
            "temperature": request.temperature,
        }
    });

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.iter().map(tool_to_function).collect());
    }

    body
}

fn turn_to_message(turn: &Turn) -> Value {
    let mut msg = json!({
        "role": turn.role.as_str(),
        "content": &turn.content,
    });
    if turn.role == Role::Assistant && turn.has_tool_calls() {
        msg["tool_calls"] = turn
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": &tc.id,
                    "function": {
                        "name": &tc.tool_name,
                        "arguments": &tc.arguments,
                    }
                })
            })
            .collect();
    }
    if turn.role == Role::Tool {
        if let Some(ref name) = turn.tool_name {
            msg["tool_name"] = json!(name);
        }
        if let Some(ref id) = turn.tool_call_id {
            msg["tool_call_id"] = json!(id);
        }
    }
    msg
}

fn tool_to_function(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": &spec.name,
            "description": &spec.description,
            "parameters": &spec.parameters,
        }
    })
}

/// Turn an `/api/chat` response body into an [`AssistantResponse`].
pub(crate) fn parse_response(data: &Value) -> Result<AssistantResponse> {
    let message = data
        .get("message")
        .and_then(Value::as_object)
        .ok_or_else(|| ScoutError::InferenceMalformed("response has no 'message' object".into()))?;

    let text = match message.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            return Err(ScoutError::InferenceMalformed(format!(
                "'message.content' is not a string: {other}"
            )));
        }
    };

    let raw_calls = match message.get("tool_calls") {
        None | Some(Value::Null) => return Ok(AssistantResponse::FinalText(text)),
        Some(Value::Array(calls)) => calls,
        Some(other) => {
            return Err(ScoutError::InferenceMalformed(format!(
                "'message.tool_calls' is not an array: {other}"
            )));
        }
    };

    if raw_calls.is_empty() {
        return Ok(AssistantResponse::FinalText(text));
    }

    let mut calls = Vec::with_capacity(raw_calls.len());
    for tc in raw_calls {
        let function = &tc["function"];
        let name = function["name"]
            .as_str()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ScoutError::InferenceMalformed(format!("tool call without a name: {tc}")))?;

        // Some models send arguments as a JSON-encoded string. An undecodable
        // string is kept as-is so schema validation reports it to the model.
        let arguments = match &function["arguments"] {
            Value::Null => json!({}),
            Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        };

        let id = tc["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

        calls.push(ToolInvocation {
            id,
            tool_name: name.to_string(),
            arguments,
        });
    }

    Ok(AssistantResponse::ToolCallRequest { text, calls })
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<AssistantResponse> {
        let body = request_body(request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat request"
        );

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ScoutError::InferenceUnavailable(format!(
                    "model '{}' not found (try `ollama pull {}`): {text}",
                    request.model, request.model
                )));
            }
            return Err(ScoutError::InferenceUnavailable(format!("HTTP {status}: {text}")));
        }

        let raw = resp.text().await.map_err(|e| self.map_send_error(e))?;
        let data: Value = serde_json::from_str(&raw)
            .map_err(|e| ScoutError::InferenceMalformed(format!("invalid JSON body: {e}")))?;

        parse_response(&data)
    }

    async fn health_check(&self) -> Result<()> {
        info!(base_url = %self.base_url, "checking ollama health");
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ScoutError::InferenceUnavailable(format!("ollama unreachable: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ScoutError::InferenceUnavailable(format!(
                "ollama unhealthy: HTTP {}",
                resp.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::ToolResult;

    fn request(messages: Vec<Turn>, tools: Vec<ToolSpec>) -> InferenceRequest {
        InferenceRequest {
            model: "llama3.1:8b".into(),
            system: Some("be brief".into()),
            messages,
            tools,
            temperature: 0.3,
        }
    }

    #[test]
    fn test_body_has_system_first_and_no_stream() {
        let body = request_body(&request(vec![Turn::user("hi")], vec![]));
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_body_encodes_tools_and_tool_turns() {
        let call = ToolInvocation {
            id: "call_9".into(),
            tool_name: "stock_snapshot".into(),
            arguments: json!({"symbol": "AAPL"}),
        };
        let result = ToolResult::success(&call, json!({"price": 1.0}));
        let spec = ToolSpec::new("stock_snapshot", "quotes", json!({"type": "object"}));
        let body = request_body(&request(
            vec![
                Turn::user("AAPL?"),
                Turn::assistant_tool_calls("", vec![call]),
                Turn::tool(&result),
            ],
            vec![spec],
        ));
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "stock_snapshot");
        let assistant = &body["messages"][2];
        assert_eq!(assistant["tool_calls"][0]["function"]["arguments"]["symbol"], "AAPL");
        let tool = &body["messages"][3];
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_name"], "stock_snapshot");
        assert_eq!(tool["tool_call_id"], "call_9");
    }

    #[test]
    fn test_parse_final_text() {
        let resp = parse_response(&json!({"message": {"role": "assistant", "content": " Done. "}})).unwrap();
        assert_eq!(resp, AssistantResponse::FinalText("Done.".into()));
    }

    #[test]
    fn test_parse_empty_is_empty_final_text() {
        let resp = parse_response(&json!({"message": {"role": "assistant", "content": "", "tool_calls": []}})).unwrap();
        assert_eq!(resp, AssistantResponse::FinalText(String::new()));
    }

    #[test]
    fn test_parse_tool_calls_with_string_arguments() {
        let resp = parse_response(&json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "nba_stats", "arguments": "{\"player_name\": \"Tatum\"}"}},
                    {"id": "abc", "function": {"name": "web_search", "arguments": {"query": "celtics"}}}
                ]
            }
        }))
        .unwrap();
        let AssistantResponse::ToolCallRequest { calls, .. } = resp else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments["player_name"], "Tatum");
        assert_eq!(calls[1].id, "abc");
        assert_eq!(calls[1].arguments["query"], "celtics");
    }

    #[test]
    fn test_parse_keeps_undecodable_arguments() {
        let resp = parse_response(&json!({
            "message": {"tool_calls": [{"function": {"name": "read_file", "arguments": "path=src"}}]}
        }))
        .unwrap();
        let AssistantResponse::ToolCallRequest { calls, .. } = resp else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments, json!("path=src"));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_response(&json!({"error": "boom"})),
            Err(ScoutError::InferenceMalformed(_))
        ));
        assert!(matches!(
            parse_response(&json!({"message": {"tool_calls": [{"function": {}}]}})),
            Err(ScoutError::InferenceMalformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port 9 (discard) is closed on test machines.
        let client = OllamaClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = client
            .complete(&request(vec![Turn::user("hi")], vec![]))
            .await
            .unwrap_err();
        assert!(err.is_inference_retryable());
    }
}
