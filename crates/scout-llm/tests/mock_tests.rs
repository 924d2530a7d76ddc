#[cfg(test)]
mod tests {
    use scout_core::{ScoutError, Turn};
    use scout_llm::mock::{MockFailure, MockInference};
    use scout_llm::provider::{AssistantResponse, InferenceClient, InferenceRequest};
    use serde_json::json;

    fn make_request(text: &str) -> InferenceRequest {
        InferenceRequest {
            model: "llama3.1:8b".to_string(),
            system: Some("be nice".into()),
            messages: vec![Turn::user(text)],
            tools: vec![],
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let client = MockInference::new().with_response("Hello!");
        let resp = client.complete(&make_request("hi")).await.unwrap();
        assert_eq!(resp, AssistantResponse::FinalText("Hello!".into()));
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let client = MockInference::new().with_tool_call("stock_snapshot", json!({"symbol": "AAPL"}));
        let resp = client.complete(&make_request("AAPL?")).await.unwrap();
        match resp {
            AssistantResponse::ToolCallRequest { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].tool_name, "stock_snapshot");
                assert!(calls[0].id.starts_with("call_"));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mock_errors_map_to_inference_kinds() {
        let client = MockInference::new()
            .with_error(MockFailure::Unavailable, "connection refused")
            .with_error(MockFailure::Timeout, "300s")
            .with_error(MockFailure::Malformed, "not json");
        let req = make_request("hi");
        assert!(matches!(client.complete(&req).await, Err(ScoutError::InferenceUnavailable(_))));
        assert!(matches!(client.complete(&req).await, Err(ScoutError::InferenceTimeout(_))));
        assert!(matches!(client.complete(&req).await, Err(ScoutError::InferenceMalformed(_))));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let client = MockInference::new().with_response("ok");
        let _ = client.complete(&make_request("hello")).await;
        let recorded = client.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].system, Some("be nice".into()));
        assert_eq!(recorded[0].messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_mock_multiple_responses_in_order() {
        let client = MockInference::new()
            .with_response("first")
            .with_response("second");
        let req = make_request("hi");
        assert_eq!(client.complete(&req).await.unwrap().text(), "first");
        assert_eq!(client.complete(&req).await.unwrap().text(), "second");
        assert_eq!(client.remaining(), 0);
        assert!(client.complete(&req).await.unwrap().text().contains("no more queued"));
    }

    #[tokio::test]
    async fn test_mock_health() {
        assert!(MockInference::new().health_check().await.is_ok());
        assert!(MockInference::new().unhealthy().health_check().await.is_err());
    }
}
