use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolInvocation, ToolResult};

/// Who produced a turn. The system prompt travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One entry in a conversation's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by the assistant in this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Set on `tool` turns; references a call from a preceding assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: vec![],
            tool_name: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// An assistant turn that requests tool calls.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolInvocation>) -> Self {
        let mut turn = Self::new(Role::Assistant, text);
        turn.tool_calls = calls;
        turn
    }

    pub fn tool(result: &ToolResult) -> Self {
        let mut turn = Self::new(Role::Tool, result.content());
        turn.tool_name = Some(result.tool_name.clone());
        turn.tool_call_id = Some(result.tool_call_id.clone());
        turn
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
