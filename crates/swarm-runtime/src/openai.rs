//! OpenAI LLM Provider
//!
//! Implementation of `LlmProvider` for the Chat Completions API. Any
//! OpenAI-compatible server (Ollama, vLLM, LM Studio) works by pointing
//! `OPENAI_BASE_URL` at it.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use swarm_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{CompletionStream, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
    response::AgentResponse,
    tool::ToolCall,
};

use crate::convert::{is_native_tool_result, parse_arguments, tool_results_text};
use crate::credentials::{self, EnvLookup};
use crate::http;
use crate::sse::{ChunkDecoder, ChunkStamp, SseEvent, chunk_stream, parse_data};

const PROVIDER: &str = "openai";

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Server root, without the `/v1` suffix
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.into(),
            timeout: http::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim_end_matches('/');
        self.base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        self
    }

    /// `OPENAI_API_KEY` (required) and `OPENAI_BASE_URL`
    pub fn from_lookup(lookup: &EnvLookup) -> Result<Self> {
        let api_key = credentials::require(lookup, "OpenAI", &["OPENAI_API_KEY"])?;
        let config = Self::new(api_key);
        Ok(match credentials::optional(lookup, &["OPENAI_BASE_URL"]) {
            Some(url) => config.with_base_url(url),
            None => config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&credentials::process_env())
    }
}

/// OpenAI LLM provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout)?,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url, path)
    }

    /// Convert agent messages to the Chat Completions format
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::User => json!({"role": "user", "content": m.content}),
                Role::Assistant if m.has_tool_calls() => {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": Value::Object(call.arguments.clone()).to_string(),
                                },
                            })
                        })
                        .collect();
                    let content = if m.content.is_empty() {
                        Value::Null
                    } else {
                        Value::String(m.content.clone())
                    };
                    json!({"role": "assistant", "content": content, "tool_calls": calls})
                }
                Role::Assistant => json!({"role": "assistant", "content": m.content}),
                Role::Tool if is_native_tool_result(m) => json!({
                    "role": "tool",
                    "tool_call_id": m.metadata.tool_call_id,
                    "content": m.content,
                }),
                Role::Tool => json!({"role": "user", "content": tool_results_text(m)}),
            })
            .collect()
    }

    fn build_payload(messages: &[Message], options: &GenerationOptions, stream: bool) -> Value {
        let mut payload = json!({
            "model": options.model,
            "messages": Self::convert_messages(messages),
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_tokens,
        });

        if !options.stop_sequences.is_empty() {
            payload["stop"] = json!(options.stop_sequences);
        }
        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|def| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": def.name,
                            "description": def.description,
                            "parameters": def.parameters,
                        },
                    })
                })
                .collect();
            payload["tools"] = json!(tools);
        }
        if stream {
            payload["stream"] = json!(true);
            payload["stream_options"] = json!({"include_usage": true});
        }

        payload
    }

    /// Convert a Chat Completions response to the canonical response
    fn convert_response(response: ChatResponse, requested_model: &str) -> Result<AgentResponse> {
        let model = response.model.unwrap_or_else(|| requested_model.to_string());
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            AgentError::Parse("OpenAI response contained no choices".into())
        })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                ToolCall::new(call.function.name, parse_arguments(&call.function.arguments))
                    .with_id(call.id)
            })
            .collect();

        let mut message = Message::assistant(choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls)
            .with_origin(PROVIDER, model);
        if let Some(id) = response.id {
            message = message.with_extra("response_id", Value::String(id));
        }
        if let Some(reason) = &choice.finish_reason {
            message = message.with_extra("stop_reason", Value::String(reason.clone()));
        }

        let usage = response.usage.map(WireUsage::into_usage);
        message.metadata.tokens = usage.as_ref().map(|u| u.completion_tokens);

        Ok(AgentResponse::success(message)
            .with_usage(usage)
            .with_finish_reason(choice.finish_reason.as_deref().map(finish_reason)))
    }
}

fn finish_reason(raw: &str) -> FinishReason {
    match raw {
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolUse,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.config.api_key);
        match http::send(PROVIDER, request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AgentResponse> {
        let request = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&Self::build_payload(messages, options, false));

        tracing::debug!(model = %options.model, messages = messages.len(), "OpenAI completion");
        let response: ChatResponse = http::send_json(PROVIDER, request).await?;
        Self::convert_response(response, &options.model)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let request = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&Self::build_payload(messages, options, true));

        let response = http::send(PROVIDER, request).await?;
        Ok(chunk_stream(PROVIDER, response, StreamDecoder::new(&options.model)))
    }
}

/// Tool call being assembled from deltas
#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

struct StreamDecoder {
    stamp: ChunkStamp,
    response_id: Option<String>,
    calls: BTreeMap<usize, PartialCall>,
}

impl StreamDecoder {
    fn new(model: &str) -> Self {
        Self {
            stamp: ChunkStamp::new(PROVIDER, model),
            response_id: None,
            calls: BTreeMap::new(),
        }
    }

    fn chunk(&mut self, message: Message) -> Message {
        let message = self.stamp.stamp(message);
        match &self.response_id {
            Some(id) => message.with_extra("response_id", Value::String(id.clone())),
            None => message,
        }
    }

    fn take_calls(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.calls)
            .into_values()
            .map(|partial| {
                let call = ToolCall::new(partial.name, parse_arguments(&partial.arguments));
                match partial.id {
                    Some(id) => call.with_id(id),
                    None => call,
                }
            })
            .collect()
    }
}

impl ChunkDecoder for StreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<AgentResponse>> {
        if event.data.trim() == "[DONE]" {
            return Ok(Vec::new());
        }
        let chunk: StreamChunk = parse_data(PROVIDER, event)?;

        if self.response_id.is_none() {
            self.response_id = chunk.id;
        }
        if let Some(model) = chunk.model {
            self.stamp.model = model;
        }

        let mut out = Vec::new();
        for choice in chunk.choices {
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let partial = self.calls.entry(delta.index).or_default();
                if delta.id.is_some() {
                    partial.id = delta.id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }

            let text = choice.delta.content.unwrap_or_default();
            let reason = choice.finish_reason;
            let calls = if reason.is_some() { self.take_calls() } else { Vec::new() };

            if text.is_empty() && calls.is_empty() && reason.is_none() {
                continue;
            }

            let mut message = Message::assistant(text).with_tool_calls(calls);
            if let Some(raw) = &reason {
                message = message.with_extra("stop_reason", Value::String(raw.clone()));
            }
            let message = self.chunk(message);
            out.push(
                AgentResponse::success(message)
                    .with_finish_reason(reason.as_deref().map(finish_reason)),
            );
        }

        if let Some(usage) = chunk.usage {
            let message = self.chunk(Message::assistant(""));
            out.push(AgentResponse::success(message).with_usage(Some(usage.into_usage())));
        }

        Ok(out)
    }

    fn finish(&mut self) -> Vec<AgentResponse> {
        // some compatible servers end the stream without a finish_reason
        let calls = self.take_calls();
        if calls.is_empty() {
            return Vec::new();
        }
        let message = self.chunk(Message::assistant("").with_tool_calls(calls));
        vec![AgentResponse::success(message).with_finish_reason(Some(FinishReason::ToolUse))]
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl WireUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage::new(self.prompt_tokens, self.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use swarm_core::provider::collect_stream;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn setup(response: ResponseTemplate) -> (MockServer, OpenAiProvider) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&server)
            .await;

        let config =
            OpenAiConfig::new("test_api_key").with_base_url(format!("{}/v1/", server.uri()));
        (server, OpenAiProvider::from_config(config).unwrap())
    }

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "gpt-4o".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_keeps_message_and_content_in_sync() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        });
        let (_server, provider) = setup(ResponseTemplate::new(200).set_body_json(body)).await;

        let response = provider
            .complete(&[Message::user("Hi")], &options())
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.content(), "Hello there");
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.message().role, Role::Assistant);
        assert_eq!(response.model(), Some("gpt-4o-2024-08-06"));
        assert_eq!(response.message().metadata.extra["response_id"], "chatcmpl-1");
        assert_eq!(response.usage(), Some(&TokenUsage::new(9, 3)));
        assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_complete_with_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "filesystem",
                            "arguments": "{\"method\":\"read_file\",\"params\":{\"path\":\"a.txt\"}}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let (_server, provider) = setup(ResponseTemplate::new(200).set_body_json(body)).await;

        let response = provider.complete(&[Message::user("read a.txt")], &options()).await.unwrap();

        assert_eq!(response.content(), "");
        assert_eq!(response.content(), response.message().content);
        let call = &response.tool_calls()[0];
        assert_eq!(call.name, "filesystem");
        assert_eq!(call.id.as_deref(), Some("call_abc"));
        assert_eq!(call.arguments["method"], "read_file");
        assert_eq!(response.finish_reason(), Some(&FinishReason::ToolUse));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_typed_error() {
        let body = json!({"error": {"message": "Rate limit reached", "type": "requests"}});
        let (_server, provider) = setup(ResponseTemplate::new(429).set_body_json(body)).await;

        let err = provider.complete(&[Message::user("Hi")], &options()).await.unwrap_err();
        assert!(matches!(err, AgentError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_tool_round_trip_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    {"role": "user", "content": "read a.txt"},
                    {"role": "assistant", "content": null, "tool_calls": [{"id": "call_1", "type": "function"}]},
                    {"role": "tool", "tool_call_id": "call_1", "content": "file body"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "done"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;
        let config = OpenAiConfig::new("k").with_base_url(server.uri());
        let provider = OpenAiProvider::from_config(config).unwrap();

        let call = ToolCall::new("filesystem", serde_json::Map::new()).with_id("call_1");
        let messages = vec![
            Message::user("read a.txt"),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::tool("file body", Some("call_1".into())),
        ];
        let response = provider.complete(&messages, &options()).await.unwrap();
        assert_eq!(response.content(), "done");
    }

    #[tokio::test]
    async fn test_stream_aggregates_to_one_message() {
        let sse = [
            r#"data: {"id":"chatcmpl-9","model":"gpt-4o","choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#,
            r#"data: {"id":"chatcmpl-9","choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"id":"chatcmpl-9","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_7","function":{"name":"filesystem","arguments":"{\"method\":"}}]}}]}"#,
            r#"data: {"id":"chatcmpl-9","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"list_directory\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            r#"data: {"id":"chatcmpl-9","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":4}}"#,
            "data: [DONE]",
        ]
        .join("\n\n")
            + "\n\n";
        let (_server, provider) = setup(
            ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
        )
        .await;

        let stream = provider
            .complete_stream(&[Message::user("Hi")], &options())
            .await
            .unwrap();
        let response = collect_stream(stream).await.unwrap();

        assert_eq!(response.content(), "Hello");
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.tool_calls().len(), 1);
        assert_eq!(response.tool_calls()[0].arguments["method"], "list_directory");
        assert_eq!(response.usage().unwrap().total_tokens, 9);
        assert_eq!(response.finish_reason(), Some(&FinishReason::ToolUse));
        assert_eq!(response.message().metadata.extra["response_id"], "chatcmpl-9");
        assert_eq!(response.message().metadata.extra["streamed"], true);
    }

    #[test]
    fn test_untagged_tool_message_becomes_user_turn() {
        let converted = OpenAiProvider::convert_messages(&[Message::tool("12:00", None)]);
        assert_eq!(converted[0]["role"], "user");
        assert!(converted[0]["content"].as_str().unwrap().ends_with("12:00"));
    }

    #[test]
    fn test_from_lookup_requires_key() {
        let empty: EnvLookup = std::sync::Arc::new(|_| None);
        let err = OpenAiConfig::from_lookup(&empty).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
