//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM providers (OpenAI, Anthropic, Gemini, etc.)
//! allowing the agent to work with any backend without code changes.
//!
//! Every provider returns an [`AgentResponse`] built around the one message
//! it assembled from the vendor payload. Streaming providers yield one
//! response per chunk; [`StreamAccumulator`] folds them into the aggregate.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use swarm_core::provider::{GenerationOptions, LlmProvider};
//!
//! let provider = OpenAiProvider::from_env()?;
//! let response = provider.complete(&messages, &GenerationOptions::default()).await?;
//! assert_eq!(response.content(), response.message().content);
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, MessageMetadata};
use crate::response::AgentResponse;
use crate::tool::{FunctionDefinition, ToolCall};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o", "claude-3-5-sonnet-latest", "gemini-1.5-pro")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Functions the model may call
    #[serde(default)]
    pub tools: Vec<FunctionDefinition>,
}

fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }
fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
            tools: Vec::new(),
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// Stream of per-chunk responses
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<AgentResponse>> + Send>>;

/// Metadata key marking a chunk's position in its stream
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider id (e.g., "openai")
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AgentResponse>;

    /// Generate a streaming completion
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream>;
}

/// Folds streamed chunk responses into one final response
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
    metadata: Option<MessageMetadata>,
    chunks: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk
    pub fn push(&mut self, chunk: &AgentResponse) {
        let message = chunk.message();
        self.content.push_str(&message.content);

        for call in &message.tool_calls {
            match self
                .tool_calls
                .iter_mut()
                .find(|existing| existing.id.is_some() && existing.id == call.id)
            {
                Some(existing) => *existing = call.clone(),
                None => self.tool_calls.push(call.clone()),
            }
        }

        if self.metadata.is_none() {
            self.metadata = Some(message.metadata.clone());
        }
        if let Some(usage) = chunk.usage() {
            self.usage = Some(usage.clone());
        }
        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(reason.clone());
        }
        self.chunks += 1;
    }

    /// Number of chunks seen
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Build the aggregate response. The final message is created here, once.
    pub fn finish(self) -> AgentResponse {
        let mut metadata = self.metadata.unwrap_or_default();
        metadata.extra.remove(CHUNK_INDEX_KEY);
        metadata
            .extra
            .insert("streamed".into(), serde_json::Value::Bool(true));
        metadata
            .extra
            .insert("chunks".into(), serde_json::Value::from(self.chunks));

        let mut message = Message::assistant(self.content).with_tool_calls(self.tool_calls);
        message.metadata = metadata;

        AgentResponse::success(message)
            .with_usage(self.usage)
            .with_finish_reason(self.finish_reason)
    }
}

/// Drain a stream into its aggregate response
pub async fn collect_stream(mut stream: CompletionStream) -> Result<AgentResponse> {
    let mut acc = StreamAccumulator::new();
    while let Some(chunk) = stream.next().await {
        acc.push(&chunk?);
    }
    Ok(acc.finish())
}
