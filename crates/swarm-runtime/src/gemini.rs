//! Gemini LLM Provider
//!
//! Implementation of `LlmProvider` for the Generative Language API
//! (`generateContent` / `streamGenerateContent`).

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

use crate::convert::{system_prompt, tool_results_text};
use crate::credentials::{self, EnvLookup};
use crate::http;
use crate::sse::{ChunkDecoder, ChunkStamp, SseEvent, chunk_stream, parse_data};

const PROVIDER: &str = "gemini";

/// Gemini provider configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

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

    /// `GEMINI_API_KEY` (falling back to `GOOGLE_API_KEY`) and `GEMINI_BASE_URL`
    pub fn from_lookup(lookup: &EnvLookup) -> Result<Self> {
        let api_key =
            credentials::require(lookup, "Gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"])?;
        let config = Self::new(api_key);
        Ok(match credentials::optional(lookup, &["GEMINI_BASE_URL"]) {
            Some(url) => config.with_base_url(url),
            None => config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&credentials::process_env())
    }
}

/// Gemini LLM provider
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout)?,
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(GeminiConfig::from_env()?)
    }

    fn post(&self, model: &str, action: &str, payload: &Value) -> RequestBuilder {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let mut query = vec![("key", self.config.api_key.as_str())];
        if action == "streamGenerateContent" {
            query.push(("alt", "sse"));
        }
        self.client
            .post(format!("{}/v1beta/models/{}:{}", self.config.base_url, model, action))
            .query(&query)
            .json(payload)
    }

    /// Convert agent messages to `contents`.
    ///
    /// Tool results become `functionResponse` parts named after the tool; the
    /// API pairs them with calls by name. Same-role turns are merged.
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

        for m in messages {
            let (role, parts) = match m.role {
                Role::System => continue,
                Role::User => ("user", vec![json!({"text": m.content})]),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !m.content.is_empty() {
                        parts.push(json!({"text": m.content}));
                    }
                    for call in &m.tool_calls {
                        parts.push(json!({
                            "functionCall": {"name": call.name, "args": call.arguments}
                        }));
                    }
                    ("model", parts)
                }
                Role::Tool => match (&m.name, &m.metadata.tool_call_id) {
                    (Some(name), Some(_)) => (
                        "user",
                        vec![json!({
                            "functionResponse": {"name": name, "response": {"content": m.content}}
                        })],
                    ),
                    _ => ("user", vec![json!({"text": tool_results_text(m)})]),
                },
            };

            if parts.is_empty() {
                continue;
            }
            match turns.last_mut() {
                Some((last, existing)) if *last == role => existing.extend(parts),
                _ => turns.push((role, parts)),
            }
        }

        turns
            .into_iter()
            .map(|(role, parts)| json!({"role": role, "parts": parts}))
            .collect()
    }

    fn build_payload(messages: &[Message], options: &GenerationOptions) -> Value {
        let mut generation = json!({
            "temperature": options.temperature,
            "topP": options.top_p,
            "maxOutputTokens": options.max_tokens,
        });
        if !options.stop_sequences.is_empty() {
            generation["stopSequences"] = json!(options.stop_sequences);
        }

        let mut payload = json!({
            "contents": Self::convert_messages(messages),
            "generationConfig": generation,
        });

        if let Some(system) = system_prompt(messages) {
            payload["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !options.tools.is_empty() {
            let declarations: Vec<Value> = options
                .tools
                .iter()
                .map(|def| {
                    json!({
                        "name": def.name,
                        "description": def.description,
                        "parameters": def.parameters,
                    })
                })
                .collect();
            payload["tools"] = json!([{"functionDeclarations": declarations}]);
        }

        payload
    }

    /// One response body (whole completion or one stream chunk) as a message
    fn convert_candidate(
        response: GenerateResponse,
        model: &str,
    ) -> Result<(Message, Option<TokenUsage>, Option<FinishReason>)> {
        let model = response.model_version.unwrap_or_else(|| model.to_string());

        let Some(candidate) = response.candidates.into_iter().next() else {
            if let Some(feedback) = response.prompt_feedback {
                return Err(AgentError::Provider(format!(
                    "Gemini blocked the prompt: {}",
                    feedback.get("blockReason").and_then(Value::as_str).unwrap_or("unknown reason")
                )));
            }
            // usage-only chunk
            let message = Message::assistant("").with_origin(PROVIDER, model);
            return Ok((message, response.usage_metadata.map(WireUsage::into_usage), None));
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(part_text) = part.text {
                text.push_str(&part_text);
            }
            if let Some(call) = part.function_call {
                let args = match call.args {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                tool_calls.push(ToolCall::new(call.name, args));
            }
        }

        let mut message = Message::assistant(text)
            .with_tool_calls(tool_calls)
            .with_origin(PROVIDER, model);
        if let Some(id) = response.response_id {
            message = message.with_extra("response_id", Value::String(id));
        }
        if let Some(reason) = &candidate.finish_reason {
            message = message.with_extra("stop_reason", Value::String(reason.clone()));
        }
        if let Some(ratings) = candidate.safety_ratings {
            message = message.with_extra("safety_ratings", ratings);
        }

        let finish = candidate
            .finish_reason
            .as_deref()
            .map(|raw| finish_reason(raw, message.has_tool_calls()));
        let usage = response.usage_metadata.map(WireUsage::into_usage);
        message.metadata.tokens = usage.as_ref().map(|u| u.completion_tokens);

        Ok((message, usage, finish))
    }
}

fn finish_reason(raw: &str, has_tool_calls: bool) -> FinishReason {
    match raw {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        _ if has_tool_calls => FinishReason::ToolUse,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .client
            .get(format!("{}/v1beta/models", self.config.base_url))
            .query(&[("key", self.config.api_key.as_str())]);
        match http::send(PROVIDER, request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Gemini health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AgentResponse> {
        let payload = Self::build_payload(messages, options);
        tracing::debug!(model = %options.model, messages = messages.len(), "Gemini completion");

        let request = self.post(&options.model, "generateContent", &payload);
        let response: GenerateResponse = http::send_json(PROVIDER, request).await?;
        let (message, usage, finish) = Self::convert_candidate(response, &options.model)?;

        Ok(AgentResponse::success(message)
            .with_usage(usage)
            .with_finish_reason(finish))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let payload = Self::build_payload(messages, options);
        let request = self.post(&options.model, "streamGenerateContent", &payload);
        let response = http::send(PROVIDER, request).await?;
        Ok(chunk_stream(PROVIDER, response, StreamDecoder {
            stamp: ChunkStamp::new(PROVIDER, options.model.clone()),
        }))
    }
}

struct StreamDecoder {
    stamp: ChunkStamp,
}

impl ChunkDecoder for StreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<AgentResponse>> {
        let body: GenerateResponse = parse_data(PROVIDER, event)?;
        let (message, usage, finish) = GeminiProvider::convert_candidate(body, &self.stamp.model)?;
        if let Some(model) = &message.metadata.model {
            self.stamp.model.clone_from(model);
        }
        let message = self.stamp.stamp(message);
        Ok(vec![
            AgentResponse::success(message)
                .with_usage(usage)
                .with_finish_reason(finish),
        ])
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl WireUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage::new(self.prompt_token_count, self.candidates_token_count)
    }
}

#[cfg(test)]
mod tests {
    use swarm_core::provider::collect_stream;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "gemini-1.5-pro".into(),
            ..Default::default()
        }
    }

    async fn setup(action: &str, response: ResponseTemplate) -> (MockServer, GeminiProvider) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/gemini-1.5-pro:{action}")))
            .and(query_param("key", "test_api_key"))
            .respond_with(response)
            .mount(&server)
            .await;
        let config = GeminiConfig::new("test_api_key").with_base_url(server.uri());
        (server, GeminiProvider::from_config(config).unwrap())
    }

    #[tokio::test]
    async fn test_complete_with_safety_ratings() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Bonjour"}, {"text": " !"}]},
                "finishReason": "STOP",
                "safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}]
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6},
            "modelVersion": "gemini-1.5-pro-002"
        });
        let (_server, provider) =
            setup("generateContent", ResponseTemplate::new(200).set_body_json(body)).await;

        let response = provider.complete(&[Message::user("Salut")], &options()).await.unwrap();

        assert_eq!(response.content(), "Bonjour !");
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.message().role, Role::Assistant);
        assert_eq!(response.model(), Some("gemini-1.5-pro-002"));
        assert_eq!(
            response.message().metadata.extra["safety_ratings"][0]["probability"],
            "NEGLIGIBLE"
        );
        assert_eq!(response.usage(), Some(&TokenUsage::new(4, 2)));
        assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_function_call() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{
                    "functionCall": {"name": "filesystem", "args": {"method": "list_directory"}}
                }]},
                "finishReason": "STOP"
            }]
        });
        let (_server, provider) =
            setup("generateContent", ResponseTemplate::new(200).set_body_json(body)).await;

        let response = provider.complete(&[Message::user("ls")], &options()).await.unwrap();
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.tool_calls()[0].name, "filesystem");
        assert_eq!(response.finish_reason(), Some(&FinishReason::ToolUse));
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_an_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let (_server, provider) =
            setup("generateContent", ResponseTemplate::new(200).set_body_json(body)).await;

        let err = provider.complete(&[Message::user("...")], &options()).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_stream_aggregates_to_one_message() {
        let chunks = [
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hej "}]}}], "modelVersion": "gemini-1.5-pro-002"}),
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "då"}]}, "finishReason": "STOP"}],
                   "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2}}),
        ];
        let body: String = chunks.iter().map(|c| format!("data: {c}\r\n\r\n")).collect();
        let (_server, provider) = setup(
            "streamGenerateContent",
            ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
        )
        .await;

        let stream = provider.complete_stream(&[Message::user("hej")], &options()).await.unwrap();
        let response = collect_stream(stream).await.unwrap();

        assert_eq!(response.content(), "Hej då");
        assert_eq!(response.content(), response.message().content);
        assert_eq!(response.usage().unwrap().total_tokens, 5);
        assert_eq!(response.message().metadata.extra["chunks"], 2);
    }

    #[test]
    fn test_tool_results_become_function_responses() {
        let messages = vec![
            Message::system("sys"),
            Message::user("ls"),
            Message::tool("a.txt", Some("id-1".into())).with_name("filesystem"),
        ];
        let contents = GeminiProvider::convert_messages(&messages);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["parts"][1]["functionResponse"]["name"], "filesystem");

        let payload = GeminiProvider::build_payload(&messages, &options());
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "sys");
    }
}
