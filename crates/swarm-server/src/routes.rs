//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    chat_handler, chat_stream_handler, health_check, list_tools, middleware_handler,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/tools", get(list_tools))
        // Tool routing
        .route("/api/middleware", post(middleware_handler))
        // Agent API
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", get(chat_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Map, Value, json};
    use tower::ServiceExt;

    use swarm_core::{
        AgentError, AgentResponse, CompletionStream, GenerationOptions, LlmProvider, Message,
        MethodSchema, Result, SwarmContext, Tool, ToolOutput, ToolSchema,
    };

    use super::*;
    use crate::config::ServerConfig;
    use crate::state::ProviderFactory;

    struct Canned;

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<AgentResponse> {
            Ok(AgentResponse::success(Message::assistant("Hej, hur kan jag hjälpa?")))
        }

        async fn complete_stream(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<CompletionStream> {
            Err(AgentError::Provider("streaming not supported".into()))
        }
    }

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Tool for Counter {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "counter".into(),
                description: "Counts calls".into(),
                methods: vec![MethodSchema {
                    name: "bump".into(),
                    description: "Add one".into(),
                    parameters: Vec::new(),
                }],
                accepts_intents: false,
                category: None,
            }
        }

        async fn call(&self, _method: &str, _params: &Map<String, Value>) -> Result<ToolOutput> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolOutput::Text(format!("count {n}")))
        }
    }

    fn app_with(providers: ProviderFactory) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = SwarmContext::new();
        context.registry().register(Counter(calls.clone()));
        let state = AppState::new(context, ServerConfig::default(), providers);
        (router(state), calls)
    }

    fn app() -> (Router, Arc<AtomicUsize>) {
        app_with(Arc::new(|_model: &str| -> Result<Arc<dyn LlmProvider>> {
            Ok(Arc::new(Canned))
        }))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_reports_provider_and_tools() {
        let (app, _) = app();
        let (status, body) = send(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"], 1);
        assert_eq!(body["provider"]["name"], "canned");
        assert_eq!(body["provider"]["connected"], true);
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (app, _) = app();
        let (status, body) = send(app, "GET", "/api/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["tools"][0]["name"], "counter");
    }

    #[tokio::test]
    async fn test_middleware_routes_agent_input() {
        let (app, calls) = app();
        let input = json!({"mcp": [
            {"tool": "counter", "method": "bump"},
            {"tool": "counter", "method": "bump"},
        ]});
        let (status, body) = send(app, "POST", "/api/middleware", Some(&input.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "count 1\n\ncount 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_middleware_missing_tool_is_client_error() {
        let (app, calls) = app();
        let input = json!({"mcp": {"method": "bump"}});
        let (status, body) = send(app, "POST", "/api/middleware", Some(&input.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_client_error() {
        let (app, _) = app();
        let (status, body) = send(app, "POST", "/api/middleware", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_chat_returns_agent_response() {
        let (app, _) = app();
        let request = json!({"message": "Hej!", "model": "claude-3-5-haiku-latest"});
        let (status, body) = send(app, "POST", "/api/chat", Some(&request.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["content"], "Hej, hur kan jag hjälpa?");
        assert_eq!(body["content"], body["message"]["content"]);
        assert_eq!(body["model"], "claude-3-5-haiku-latest");
        assert!(body["conversation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_chat_empty_message_rejected() {
        let (app, _) = app();
        let (status, _) = send(app, "POST", "/api/chat", Some(r#"{"message": "  "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_missing_credential() {
        let (app, _) = app_with(Arc::new(|_model: &str| -> Result<Arc<dyn LlmProvider>> {
            Err(AgentError::MissingCredential {
                provider: "OpenAI".into(),
                variable: "OPENAI_API_KEY".into(),
            })
        }));
        let (status, body) = send(app, "POST", "/api/chat", Some(r#"{"message": "hi"}"#)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "MISSING_CREDENTIAL");
        assert!(body["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
    }
}
