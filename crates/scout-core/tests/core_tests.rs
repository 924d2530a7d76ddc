#[cfg(test)]
mod tests {
    use scout_core::*;
    use serde_json::json;

    fn call(name: &str) -> ToolInvocation {
        ToolInvocation {
            id: "call_1".into(),
            tool_name: name.into(),
            arguments: json!({}),
        }
    }

    // ── Turn tests ─────────────────────────────────────────────

    #[test]
    fn test_user_turn() {
        let turn = Turn::user("hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "hello");
        assert!(!turn.has_tool_calls());
        assert!(turn.tool_call_id.is_none());
    }

    #[test]
    fn test_assistant_turn_carries_calls() {
        let turn = Turn::assistant_tool_calls("", vec![call("stock_snapshot")]);
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.has_tool_calls());
        assert_eq!(turn.tool_calls[0].tool_name, "stock_snapshot");
    }

    #[test]
    fn test_tool_turn_references_call() {
        let result = ToolResult::success(&call("stock_snapshot"), json!({"price": 190.1}));
        let turn = Turn::tool(&result);
        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(turn.tool_name.as_deref(), Some("stock_snapshot"));
        assert!(turn.content.contains("190.1"));
    }

    #[test]
    fn test_turn_serde_skips_empty_fields() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    // ── ToolResult tests ───────────────────────────────────────

    #[test]
    fn test_string_payload_is_passed_verbatim() {
        let result = ToolResult::success(&call("read_file"), json!("fn main() {}"));
        assert_eq!(result.content(), "fn main() {}");
        assert!(!result.is_error());
    }

    #[test]
    fn test_failure_content_names_kind() {
        let result = ToolResult::failure(&call("nope"), ToolErrorKind::UnknownTool, "unknown tool: nope");
        assert!(result.is_error());
        let content: serde_json::Value = serde_json::from_str(&result.content()).unwrap();
        assert_eq!(content["error"], "unknown_tool");
        assert_eq!(content["message"], "unknown tool: nope");
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let result = ToolResult::failure(&call("write_file"), ToolErrorKind::ValidationFailed, "cargo check failed");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["status"], "failure");
        assert_eq!(json["outcome"]["kind"], "validation_failed");
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_inference_errors_are_retryable() {
        assert!(ScoutError::InferenceUnavailable("down".into()).is_inference_retryable());
        assert!(ScoutError::InferenceTimeout("300s".into()).is_inference_retryable());
        assert!(ScoutError::InferenceMalformed("bad json".into()).is_inference_retryable());
        let exhausted = ScoutError::InferenceExhausted { attempts: 2, last: "down".into() };
        assert!(!exhausted.is_inference_retryable());
    }

    #[test]
    fn test_error_maps_to_tool_kind() {
        assert_eq!(
            ScoutError::PathEscapesRepository("../etc".into()).tool_error_kind(),
            ToolErrorKind::PathEscapesRepository
        );
        assert_eq!(
            ScoutError::ToolTimeout { tool: "run_shell".into(), reason: "no result after 120s".into() }.tool_error_kind(),
            ToolErrorKind::Timeout
        );
        assert_eq!(
            ScoutError::Repository("git commit failed".into()).tool_error_kind(),
            ToolErrorKind::ToolExecution
        );
    }

    #[test]
    fn test_error_display() {
        let err = ScoutError::InferenceExhausted { attempts: 2, last: "connection refused".into() };
        let s = err.to_string();
        assert!(s.contains("2 attempts"));
        assert!(s.contains("connection refused"));
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ScoutError = io.into();
        assert!(matches!(err, ScoutError::Io(_)));
    }
}
