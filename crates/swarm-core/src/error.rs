//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A vendor API key is not present in the environment
    #[error(
        "{provider} requires the {variable} environment variable. \
         Set it with `export {variable}=<your key>` or add it to your .env file."
    )]
    MissingCredential { provider: String, variable: String },

    /// An optional capability (backend, provider) is not available in this build
    #[error("{capability} is not available. Install it with `{install}`{}", alternative_hint(.alternative))]
    CapabilityUnavailable {
        capability: String,
        install: String,
        alternative: Option<String>,
    },

    /// Tool not found in registry
    #[error("Tool not found: '{id}'. Available tools: {}", list_or_none(.available))]
    ToolNotFound { id: String, available: Vec<String> },

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool did not finish within its time budget
    #[error("Tool '{id}' timed out after {}s", .after.as_secs_f32())]
    ToolTimeout { id: String, after: Duration },

    /// Malformed request from the caller
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Parse error (e.g., tool call parsing)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Invalid configuration at {location}: {reason}. Fix: {remedy}")]
    InvalidConfig {
        location: String,
        reason: String,
        remedy: String,
    },

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

fn list_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none registered)".into()
    } else {
        ids.join(", ")
    }
}

fn alternative_hint(alternative: &Option<String>) -> String {
    alternative
        .as_ref()
        .map(|alt| format!(" or use {alt}"))
        .unwrap_or_default()
}

impl AgentError {
    /// Shorthand for configuration errors
    pub fn config(
        location: impl Into<String>,
        reason: impl Into<String>,
        remedy: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            location: location.into(),
            reason: reason.into(),
            remedy: remedy.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Io(_)
        )
    }

    /// HTTP-style status class for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AgentError::BadRequest(_)
            | AgentError::ToolValidation(_)
            | AgentError::Parse(_)
            | AgentError::Json(_)
            | AgentError::InvalidConfig { .. } => 400,
            AgentError::Auth(_) | AgentError::MissingCredential { .. } => 401,
            AgentError::ToolNotFound { .. } => 404,
            AgentError::RateLimited(_) => 429,
            AgentError::ProviderUnavailable(_) | AgentError::CapabilityUnavailable { .. } => 503,
            AgentError::ToolTimeout { .. } => 504,
            _ => 500,
        }
    }

    /// Short machine-readable code, used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Provider(_) => "PROVIDER_ERROR",
            AgentError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AgentError::MissingCredential { .. } => "MISSING_CREDENTIAL",
            AgentError::CapabilityUnavailable { .. } => "CAPABILITY_UNAVAILABLE",
            AgentError::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            AgentError::ToolValidation(_) => "TOOL_VALIDATION",
            AgentError::ToolExecution(_) => "TOOL_EXECUTION",
            AgentError::ToolTimeout { .. } => "TOOL_TIMEOUT",
            AgentError::BadRequest(_) => "BAD_REQUEST",
            AgentError::MaxIterations(_) => "MAX_ITERATIONS",
            AgentError::Parse(_) => "PARSE_ERROR",
            AgentError::InvalidConfig { .. } => "INVALID_CONFIG",
            AgentError::RateLimited(_) => "RATE_LIMITED",
            AgentError::Auth(_) => "AUTH_FAILED",
            AgentError::Io(_) => "IO_ERROR",
            AgentError::Json(_) => "JSON_ERROR",
            AgentError::Other(_) => "INTERNAL",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(msg) => format!("The AI service encountered an error: {}", msg),
            AgentError::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            AgentError::MissingCredential { .. }
            | AgentError::CapabilityUnavailable { .. }
            | AgentError::InvalidConfig { .. }
            | AgentError::ToolNotFound { .. }
            | AgentError::ToolTimeout { .. } => self.to_string(),
            AgentError::ToolValidation(msg) => format!("Invalid tool input: {}", msg),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::BadRequest(msg) => format!("Invalid request: {}", msg),
            AgentError::MaxIterations(_) => {
                "The request took too long to process. Please try a simpler query.".into()
            }
            AgentError::RateLimited(_) => {
                "You've made too many requests. Please wait a moment.".into()
            }
            AgentError::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
