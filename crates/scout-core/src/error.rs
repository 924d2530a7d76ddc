use thiserror::Error;

use crate::tool::ToolErrorKind;

/// Unified error type for the entire Scout agent.
#[derive(Error, Debug)]
pub enum ScoutError {
    // ── Transport errors ───────────────────────────────────────
    #[error("chat not authorized: {0}")]
    UnauthorizedChat(String),

    #[error("channel error: {channel}: {reason}")]
    Channel { channel: String, reason: String },

    // ── Tool errors ────────────────────────────────────────────
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    ArgumentValidation { tool: String, reason: String },

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("tool timed out: {tool}: {reason}")]
    ToolTimeout { tool: String, reason: String },

    // ── Inference errors ───────────────────────────────────────
    #[error("inference endpoint unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("inference timed out: {0}")]
    InferenceTimeout(String),

    #[error("inference response malformed: {0}")]
    InferenceMalformed(String),

    #[error("inference failed after {attempts} attempts: {last}")]
    InferenceExhausted { attempts: u32, last: String },

    // ── Repository errors ──────────────────────────────────────
    #[error("path escapes repository: {0}")]
    PathEscapesRepository(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("repository error: {0}")]
    Repository(String),

    // ── Data provider errors ───────────────────────────────────
    #[error("provider unavailable: {provider}: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ScoutError {
    /// Inference failures the agent loop retries once before giving up.
    pub fn is_inference_retryable(&self) -> bool {
        matches!(
            self,
            ScoutError::InferenceUnavailable(_)
                | ScoutError::InferenceTimeout(_)
                | ScoutError::InferenceMalformed(_)
        )
    }

    /// Classify an error raised while dispatching a tool call.
    pub fn tool_error_kind(&self) -> ToolErrorKind {
        match self {
            ScoutError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ScoutError::ArgumentValidation { .. } => ToolErrorKind::ArgumentValidation,
            ScoutError::ToolTimeout { .. } => ToolErrorKind::Timeout,
            ScoutError::PathEscapesRepository(_) => ToolErrorKind::PathEscapesRepository,
            ScoutError::ValidationFailed(_) => ToolErrorKind::ValidationFailed,
            ScoutError::ProviderUnavailable { .. } => ToolErrorKind::ProviderUnavailable,
            _ => ToolErrorKind::ToolExecution,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
