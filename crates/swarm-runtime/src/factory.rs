//! Provider selection
//!
//! Picks an adapter from a vendor name or infers it from a model name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use swarm_core::error::{AgentError, Result};
use swarm_core::provider::LlmProvider;

use crate::anthropic::{AnthropicConfig, AnthropicProvider};
use crate::credentials::{self, EnvLookup};
use crate::gemini::{GeminiConfig, GeminiProvider};
use crate::openai::{OpenAiConfig, OpenAiProvider};

const OPENAI_PREFIXES: &[&str] = &["gpt-", "chatgpt-", "o1", "o3", "o4"];

/// Supported vendors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [Self; 3] = [Self::OpenAi, Self::Anthropic, Self::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Infer the vendor from a model name
    pub fn for_model(model: &str) -> Result<Self> {
        let lower = model.trim().to_ascii_lowercase();
        let lower = lower.strip_prefix("models/").unwrap_or(&lower);

        if OPENAI_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            Ok(Self::OpenAi)
        } else if lower.starts_with("claude") {
            Ok(Self::Anthropic)
        } else if lower.starts_with("gemini") {
            Ok(Self::Gemini)
        } else {
            Err(AgentError::config(
                "model",
                format!("cannot infer a provider for model '{model}'"),
                "use a model starting with gpt-, chatgpt-, o1, o3, o4, claude or gemini, \
                 or name the provider explicitly",
            ))
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(AgentError::config(
                "provider",
                format!("unknown provider '{other}'"),
                "use one of: openai, anthropic, gemini",
            )),
        }
    }
}

/// Build an adapter with credentials from `lookup`
pub fn build_provider_with(kind: ProviderKind, lookup: &EnvLookup) -> Result<Arc<dyn LlmProvider>> {
    tracing::info!(provider = %kind, "Building LLM provider");
    Ok(match kind {
        ProviderKind::OpenAi => {
            Arc::new(OpenAiProvider::from_config(OpenAiConfig::from_lookup(lookup)?)?)
        }
        ProviderKind::Anthropic => {
            Arc::new(AnthropicProvider::from_config(AnthropicConfig::from_lookup(lookup)?)?)
        }
        ProviderKind::Gemini => {
            Arc::new(GeminiProvider::from_config(GeminiConfig::from_lookup(lookup)?)?)
        }
    })
}

/// Build an adapter from the process environment
pub fn build_provider(kind: ProviderKind) -> Result<Arc<dyn LlmProvider>> {
    build_provider_with(kind, &credentials::process_env())
}

/// Build the adapter serving `model`
pub fn provider_for_model(model: &str) -> Result<Arc<dyn LlmProvider>> {
    build_provider(ProviderKind::for_model(model)?)
}
