//! Agent Responses
//!
//! `AgentResponse` is what every provider adapter and the agent loop hand
//! back to callers. Its text is always the text of the message it carries:
//! fields are private, the constructors derive `content` from the message,
//! and deserialization rejects payloads where the two differ.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::message::Message;
use crate::provider::{FinishReason, TokenUsage};
use crate::tool::ToolCall;

/// Error details carried by a failed response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub status: u16,
    pub message: String,
}

impl From<&AgentError> for ResponseError {
    fn from(err: &AgentError) -> Self {
        Self {
            code: err.code().to_string(),
            status: err.status_code(),
            message: err.user_message(),
        }
    }
}

/// Canonical response of one agent turn
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "ResponseWire")]
pub struct AgentResponse {
    content: String,
    message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<TokenUsage>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<FinishReason>,
}

#[derive(Deserialize)]
struct ResponseWire {
    content: String,
    message: Message,
    #[serde(default)]
    usage: Option<TokenUsage>,
    success: bool,
    #[serde(default)]
    error: Option<ResponseError>,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

impl TryFrom<ResponseWire> for AgentResponse {
    type Error = String;

    fn try_from(wire: ResponseWire) -> Result<Self, Self::Error> {
        if wire.content != wire.message.content {
            return Err(format!(
                "response content ({} bytes) differs from message content ({} bytes)",
                wire.content.len(),
                wire.message.content.len()
            ));
        }
        Ok(Self {
            content: wire.content,
            message: wire.message,
            usage: wire.usage,
            success: wire.success,
            error: wire.error,
            finish_reason: wire.finish_reason,
        })
    }
}

impl AgentResponse {
    /// Successful response around a fully built message, used as-is
    pub fn success(message: Message) -> Self {
        Self {
            content: message.content.clone(),
            message,
            usage: None,
            success: true,
            error: None,
            finish_reason: None,
        }
    }

    /// Successful response for a plain text completion.
    ///
    /// Synthesizes a minimal assistant message; adapters that already hold a
    /// message with tool calls or metadata must use [`AgentResponse::success`].
    pub fn success_text(content: impl Into<String>) -> Self {
        Self::success(Message::assistant(content))
    }

    /// Failed response; content and message content are both empty
    pub fn failure(error: &AgentError) -> Self {
        Self {
            content: String::new(),
            message: Message::assistant(String::new()),
            usage: None,
            success: false,
            error: Some(ResponseError::from(error)),
            finish_reason: Some(FinishReason::Error),
        }
    }

    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_finish_reason(mut self, reason: Option<FinishReason>) -> Self {
        self.finish_reason = reason;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&ResponseError> {
        self.error.as_ref()
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.message.tool_calls
    }

    pub fn model(&self) -> Option<&str> {
        self.message.metadata.model.as_deref()
    }
}
