//! Anthropic LLM Provider
//!
//! Implementation of `LlmProvider` for the Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use swarm_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{CompletionStream, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
    response::AgentResponse,
    tool::ToolCall,
};

use crate::convert::{is_native_tool_result, parse_arguments, system_prompt, tool_results_text};
use crate::credentials::{self, EnvLookup};
use crate::http;
use crate::sse::{ChunkDecoder, ChunkStamp, SseEvent, chunk_stream, parse_data};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic provider configuration
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.into(),
            timeout: http::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `ANTHROPIC_API_KEY` (required) and `ANTHROPIC_BASE_URL`
    pub fn from_lookup(lookup: &EnvLookup) -> Result<Self> {
        let api_key = credentials::require(lookup, "Anthropic", &["ANTHROPIC_API_KEY"])?;
        let config = Self::new(api_key);
        Ok(match credentials::optional(lookup, &["ANTHROPIC_BASE_URL"]) {
            Some(url) => config.with_base_url(url),
            None => config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&credentials::process_env())
    }
}

/// Anthropic LLM provider
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn from_config(config: AnthropicConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout)?,
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(AnthropicConfig::from_env()?)
    }

    fn post(&self, payload: &Value) -> RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(payload)
    }

    /// Convert agent messages to content blocks.
    ///
    /// System messages move to the top-level `system` field. Consecutive
    /// turns of the same role are merged, since the API requires user and
    /// assistant turns to alternate (several tool results share one turn).
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

        for m in messages {
            let (role, blocks) = match m.role {
                Role::System => continue,
                Role::User => ("user", vec![json!({"type": "text", "text": m.content})]),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": m.content}));
                    }
                    for call in &m.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    ("assistant", blocks)
                }
                Role::Tool if is_native_tool_result(m) => (
                    "user",
                    vec![json!({
                        "type": "tool_result",
                        "tool_use_id": m.metadata.tool_call_id,
                        "content": m.content,
                    })],
                ),
                Role::Tool => ("user", vec![json!({"type": "text", "text": tool_results_text(m)})]),
            };

            if blocks.is_empty() {
                continue;
            }
            match turns.last_mut() {
                Some((last, existing)) if *last == role => existing.extend(blocks),
                _ => turns.push((role, blocks)),
            }
        }

        turns
            .into_iter()
            .map(|(role, content)| json!({"role": role, "content": content}))
            .collect()
    }

    fn build_payload(messages: &[Message], options: &GenerationOptions, stream: bool) -> Value {
        let mut payload = json!({
            "model": options.model,
            "messages": Self::convert_messages(messages),
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });

        if let Some(system) = system_prompt(messages) {
            payload["system"] = json!(system);
        }
        if !options.stop_sequences.is_empty() {
            payload["stop_sequences"] = json!(options.stop_sequences);
        }
        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|def| {
                    json!({
                        "name": def.name,
                        "description": def.description,
                        "input_schema": def.parameters,
                    })
                })
                .collect();
            payload["tools"] = json!(tools);
        }
        if stream {
            payload["stream"] = json!(true);
        }

        payload
    }

    fn convert_response(response: MessagesResponse) -> AgentResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(name, input_map(input)).with_id(id));
                }
                ContentBlock::Other => {}
            }
        }

        let mut message = Message::assistant(text)
            .with_tool_calls(tool_calls)
            .with_origin(PROVIDER, response.model)
            .with_extra("response_id", Value::String(response.id));
        if let Some(reason) = &response.stop_reason {
            message = message.with_extra("stop_reason", Value::String(reason.clone()));
        }

        let usage = response.usage.map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));
        message.metadata.tokens = usage.as_ref().map(|u| u.completion_tokens);

        AgentResponse::success(message)
            .with_usage(usage)
            .with_finish_reason(response.stop_reason.as_deref().map(finish_reason))
    }
}

fn input_map(input: Value) -> serde_json::Map<String, Value> {
    match input {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn finish_reason(raw: &str) -> FinishReason {
    match raw {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolUse,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .client
            .get(format!("{}/v1/models", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION);
        match http::send(PROVIDER, request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Anthropic health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AgentResponse> {
        let payload = Self::build_payload(messages, options, false);
        tracing::debug!(model = %options.model, messages = messages.len(), "Anthropic completion");

        let response: MessagesResponse = http::send_json(PROVIDER, self.post(&payload)).await?;
        Ok(Self::convert_response(response))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let payload = Self::build_payload(messages, options, true);
        let response = http::send(PROVIDER, self.post(&payload)).await?;
        Ok(chunk_stream(PROVIDER, response, StreamDecoder::new(&options.model)))
    }
}

/// Content block being streamed
enum OpenBlock {
    Text,
    ToolUse { id: String, name: String, json: String },
}

struct StreamDecoder {
    stamp: ChunkStamp,
    response_id: Option<String>,
    input_tokens: u32,
    block: Option<OpenBlock>,
}

impl StreamDecoder {
    fn new(model: &str) -> Self {
        Self {
            stamp: ChunkStamp::new(PROVIDER, model),
            response_id: None,
            input_tokens: 0,
            block: None,
        }
    }

    fn chunk(&mut self, message: Message) -> AgentResponse {
        let message = self.stamp.stamp(message);
        let message = match &self.response_id {
            Some(id) => message.with_extra("response_id", Value::String(id.clone())),
            None => message,
        };
        AgentResponse::success(message)
    }
}

impl ChunkDecoder for StreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<AgentResponse>> {
        let event: StreamEvent = parse_data(PROVIDER, event)?;

        match event {
            StreamEvent::MessageStart { message } => {
                self.response_id = Some(message.id);
                self.stamp.model = message.model;
                self.input_tokens = message.usage.map_or(0, |u| u.input_tokens);
                Ok(Vec::new())
            }
            StreamEvent::ContentBlockStart { content_block } => match content_block {
                ContentBlock::ToolUse { id, name, .. } => {
                    self.block = Some(OpenBlock::ToolUse {
                        id,
                        name,
                        json: String::new(),
                    });
                    Ok(Vec::new())
                }
                ContentBlock::Text { text } => {
                    self.block = Some(OpenBlock::Text);
                    if text.is_empty() {
                        Ok(Vec::new())
                    } else {
                        Ok(vec![self.chunk(Message::assistant(text))])
                    }
                }
                ContentBlock::Other => {
                    self.block = None;
                    Ok(Vec::new())
                }
            },
            StreamEvent::ContentBlockDelta { delta } => match delta {
                BlockDelta::TextDelta { text } => Ok(vec![self.chunk(Message::assistant(text))]),
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(OpenBlock::ToolUse { json, .. }) = &mut self.block {
                        json.push_str(&partial_json);
                    }
                    Ok(Vec::new())
                }
                BlockDelta::Other => Ok(Vec::new()),
            },
            StreamEvent::ContentBlockStop => match self.block.take() {
                Some(OpenBlock::ToolUse { id, name, json }) => {
                    let call = ToolCall::new(name, parse_arguments(&json)).with_id(id);
                    Ok(vec![self.chunk(Message::assistant("").with_tool_calls(vec![call]))])
                }
                _ => Ok(Vec::new()),
            },
            StreamEvent::MessageDelta { delta, usage } => {
                let mut message = Message::assistant("");
                if let Some(reason) = &delta.stop_reason {
                    message = message.with_extra("stop_reason", Value::String(reason.clone()));
                }
                let usage = usage.map(|u| TokenUsage::new(self.input_tokens, u.output_tokens));
                Ok(vec![
                    self.chunk(message)
                        .with_usage(usage)
                        .with_finish_reason(delta.stop_reason.as_deref().map(finish_reason)),
                ])
            }
            StreamEvent::Error { error } => Err(AgentError::Provider(format!(
                "Anthropic stream error: {}",
                error.get("message").and_then(Value::as_str).unwrap_or("unknown")
            ))),
            StreamEvent::Other => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    id: String,
    model: String,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    ContentBlockStop,
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    Error {
        error: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use swarm_core::provider::collect_stream;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn setup(response: ResponseTemplate) -> (MockServer, AnthropicProvider) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(response)
            .mount(&server)
            .await;

        let config = AnthropicConfig::new("test_api_key").with_base_url(server.uri());
        (server, AnthropicProvider::from_config(config).unwrap())
    }

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "claude-3-5-sonnet-latest".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_basic() {
        let body = json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello! How can I assist you today?"}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "stop_sequence": null,
            "usage": {"input_tokens": 12, "output_tokens": 15}
        });
        let (_server, provider) = setup(ResponseTemplate::new(200).set_body_json(body)).await;

        let response = provider
            .complete(&[Message::system("Be brief."), Message::user("Hello?")], &options())
            .await
            .unwrap();

        assert_eq!(response.content(), "Hello! How can I assist you today?");
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.message().role, Role::Assistant);
        assert_eq!(response.model(), Some("claude-3-5-sonnet-20241022"));
        assert_eq!(response.message().metadata.extra["response_id"], "msg_123");
        assert_eq!(response.usage(), Some(&TokenUsage::new(12, 15)));
        assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_complete_tool_use_keeps_text_and_calls() {
        let body = json!({
            "id": "msg_456",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Let me search."},
                {"type": "tool_use", "id": "toolu_1", "name": "bigquery_vector_search",
                 "input": {"method": "similarity_search", "params": {"query": "refunds"}}}
            ],
            "stop_reason": "tool_use"
        });
        let (_server, provider) = setup(ResponseTemplate::new(200).set_body_json(body)).await;

        let response = provider.complete(&[Message::user("refunds?")], &options()).await.unwrap();

        assert_eq!(response.content(), "Let me search.");
        assert_eq!(response.message().content, "Let me search.");
        assert_eq!(response.tool_calls()[0].id.as_deref(), Some("toolu_1"));
        assert_eq!(response.tool_calls()[0].arguments["params"]["query"], "refunds");
        assert_eq!(response.finish_reason(), Some(&FinishReason::ToolUse));
    }

    #[tokio::test]
    async fn test_overloaded_is_unavailable() {
        let body = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        let (_server, provider) = setup(ResponseTemplate::new(529).set_body_json(body)).await;

        let err = provider.complete(&[Message::user("hi")], &options()).await.unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[tokio::test]
    async fn test_system_and_tool_results_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "system": "Be brief.",
                "messages": [
                    {"role": "user"},
                    {"role": "assistant"},
                    {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "toolu_1", "content": "a"},
                        {"type": "tool_result", "tool_use_id": "toolu_2", "content": "b"}
                    ]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_9", "model": "claude", "content": [{"type": "text", "text": "ok"}]
            })))
            .mount(&server)
            .await;
        let config = AnthropicConfig::new("k").with_base_url(server.uri());
        let provider = AnthropicProvider::from_config(config).unwrap();

        let calls = vec![
            ToolCall::new("a", serde_json::Map::new()).with_id("toolu_1"),
            ToolCall::new("b", serde_json::Map::new()).with_id("toolu_2"),
        ];
        let messages = vec![
            Message::system("Be brief."),
            Message::user("go"),
            Message::assistant("").with_tool_calls(calls),
            Message::tool("a", Some("toolu_1".into())),
            Message::tool("b", Some("toolu_2".into())),
        ];
        let response = provider.complete(&messages, &options()).await.unwrap();
        assert_eq!(response.content(), "ok");
    }

    #[tokio::test]
    async fn test_stream_aggregates_to_one_message() {
        let events = [
            ("message_start", json!({"type": "message_start", "message": {"id": "msg_s", "model": "claude-3-5-sonnet-20241022", "usage": {"input_tokens": 7}}})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi "}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "there"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("content_block_start", json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_s", "name": "filesystem", "input": {}}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"method\": \"list_"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "directory\"}"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
            ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 11}})),
            ("message_stop", json!({"type": "message_stop"})),
        ];
        let body: String = events
            .iter()
            .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
            .collect();
        let (_server, provider) =
            setup(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")).await;

        let stream = provider.complete_stream(&[Message::user("hi")], &options()).await.unwrap();
        let response = collect_stream(stream).await.unwrap();

        assert_eq!(response.content(), "Hi there");
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.tool_calls()[0].arguments["method"], "list_directory");
        assert_eq!(response.usage(), Some(&TokenUsage::new(7, 11)));
        assert_eq!(response.finish_reason(), Some(&FinishReason::ToolUse));
        assert_eq!(response.model(), Some("claude-3-5-sonnet-20241022"));
        assert_eq!(response.message().metadata.extra["response_id"], "msg_s");
    }
}
