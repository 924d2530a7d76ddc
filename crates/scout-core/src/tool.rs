use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ConversationKey, ToolCallId};

/// Declaration of a tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique name, e.g. "stock_snapshot", "write_file".
    pub name: String,
    /// Human-readable description for the model.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A request from the model to call a tool. Arguments are untrusted until
/// validated against the tool's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: ToolCallId,
    pub tool_name: String,
    pub arguments: Value,
}

/// Why a tool call produced a failure result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    ArgumentValidation,
    ToolExecution,
    Timeout,
    PathEscapesRepository,
    ValidationFailed,
    ProviderUnavailable,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::ArgumentValidation => "argument_validation",
            ToolErrorKind::ToolExecution => "tool_execution",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::PathEscapesRepository => "path_escapes_repository",
            ToolErrorKind::ValidationFailed => "validation_failed",
            ToolErrorKind::ProviderUnavailable => "provider_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure { kind: ToolErrorKind, message: String },
}

/// The result of one tool call. Exactly one is produced per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call: &ToolInvocation, payload: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            outcome: ToolOutcome::Success { payload },
        }
    }

    pub fn failure(call: &ToolInvocation, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { .. })
    }

    /// Text fed back to the model as the `tool` turn content.
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload: Value::String(s) } => s.clone(),
            ToolOutcome::Success { payload } => {
                serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
            }
            ToolOutcome::Failure { kind, message } => serde_json::json!({
                "error": kind.as_str(),
                "message": message,
            })
            .to_string(),
        }
    }
}

/// Per-call context handed to tool handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation: ConversationKey,
    pub tool_call_id: ToolCallId,
    /// When the caller stops waiting for this call.
    pub deadline: Option<Instant>,
}

/// Implemented by every tool the registry can dispatch to.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with already-validated arguments.
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> crate::Result<Value>;

    /// Whether the handler stops itself at `ctx.deadline` and leaves no
    /// partial work behind. The loop then waits for the handler's own result.
    fn honors_deadline(&self) -> bool {
        false
    }
}
