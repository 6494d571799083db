//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        State, WebSocketUpgrade,
        rejection::JsonRejection,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use swarm_core::{AgentError, AgentResponse, MiddlewareReply, StreamAccumulator, ToolSchema};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tools: usize,
    pub default_model: String,
    pub provider: ProviderHealth,
}

#[derive(Debug, Serialize)]
pub struct ProviderHealth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub count: usize,
    pub tools: Vec<ToolSchema>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), AgentError> {
        if self.message.trim().is_empty() {
            return Err(AgentError::BadRequest("message must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub model: String,
    #[serde(flatten)]
    pub response: AgentResponse,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let default_model = state.config.default_model.clone();

    let provider = match (state.providers)(&default_model) {
        Ok(provider) => ProviderHealth {
            name: Some(provider.name().to_string()),
            connected: provider.health_check().await.unwrap_or(false),
            error: None,
        },
        Err(err) => ProviderHealth {
            name: None,
            connected: false,
            error: Some(err.to_string()),
        },
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tools: state.context.registry().len(),
        default_model,
        provider,
    })
}

/// Registered tools and their schemas
pub async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    let tools = state.context.registry().schemas();
    Json(ToolsResponse {
        count: tools.len(),
        tools,
    })
}

/// Route agent input (`{"mcp": ...}`) to tools
pub async fn middleware_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<MiddlewareReply>, ApiError> {
    let Json(input) = payload?;
    let reply = state.middleware.handle_agent_input(&input).await?;
    Ok(Json(reply))
}

/// Main chat endpoint (non-streaming)
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let model = state.model(request.model.as_deref()).to_string();
    let agent = state.agent(&model, request.system_prompt.as_deref())?;

    let response = agent.respond(&request.message).await;
    let status = response
        .error()
        .and_then(|err| StatusCode::from_u16(err.status).ok())
        .unwrap_or(StatusCode::OK);

    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok((
        status,
        Json(ChatResponse {
            conversation_id,
            model,
            response,
        }),
    ))
}

/// WebSocket streaming chat
pub async fn chat_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

fn frame(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

fn error_frame(err: &AgentError) -> Message {
    frame(&json!({
        "type": "error",
        "error": err.user_message(),
        "code": err.code(),
    }))
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket error");
                break;
            }
            _ => continue,
        };

        let request = match serde_json::from_str::<ChatRequest>(msg.as_str())
            .map_err(|e| AgentError::BadRequest(e.to_string()))
            .and_then(|r| r.validate().map(|()| r))
        {
            Ok(request) => request,
            Err(err) => {
                if sender.send(error_frame(&err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let model = state.model(request.model.as_deref()).to_string();
        let stream = match state.agent(&model, request.system_prompt.as_deref()) {
            Ok(agent) => agent.stream(&request.message).await,
            Err(err) => Err(err),
        };
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                if sender.send(error_frame(&err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let mut acc = StreamAccumulator::new();
        let mut failed = false;
        while let Some(result) = stream.next().await {
            match result {
                Ok(chunk) => {
                    acc.push(&chunk);
                    let out = frame(&json!({"type": "chunk", "response": chunk}));
                    if sender.send(out).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, model = %model, "Stream failed");
                    failed = true;
                    if sender.send(error_frame(&err)).await.is_err() {
                        return;
                    }
                    break;
                }
            }
        }

        if !failed {
            tracing::debug!(model = %model, chunks = acc.chunks(), "Stream finished");
            let done = frame(&json!({"type": "done", "response": acc.finish()}));
            if sender.send(done).await.is_err() {
                return;
            }
        }
    }
}
