//! # swarm-runtime
//!
//! LLM provider adapters for the swarm agent stack.
//!
//! ## Providers
//!
//! - **OpenAI**: Chat Completions API (also any OpenAI-compatible server via `OPENAI_BASE_URL`)
//! - **Anthropic**: Messages API
//! - **Gemini**: Generative Language API
//!
//! Every adapter translates the vendor payload into one canonical
//! [`Message`](swarm_core::Message) and hands it to
//! [`AgentResponse::success`](swarm_core::AgentResponse::success), so tool
//! calls and vendor metadata reach the caller untouched.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use swarm_runtime::provider_for_model;
//!
//! let provider = provider_for_model("claude-3-5-sonnet-latest")?;
//! let agent = AgentBuilder::new()
//!     .provider(provider)
//!     .middleware(SwarmContext::global().middleware(MiddlewareConfig::default()))
//!     .build()?;
//! ```

pub mod anthropic;
pub mod convert;
pub mod credentials;
pub mod factory;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use factory::{ProviderKind, build_provider, build_provider_with, provider_for_model};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

// Re-export core types for convenience
pub use swarm_core::{
    Agent, AgentError, AgentResponse, LlmProvider, Message, Result, Role, SwarmContext, Tool,
    ToolRegistry,
};
