//! # swarm-core
//!
//! Canonical agent model, shared tool registry and the middleware that routes
//! agent tool calls to handlers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SwarmContext                            │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │    Agent    │──▶│  Middleware  │──▶│     ToolRegistry      │  │
//! │  │  (ReAct)    │   │ timeout+norm │   │  (one shared state)   │  │
//! │  └──────┬──────┘   └──────────────┘   └───────────────────────┘  │
//! │         │                                                        │
//! │  ┌──────▼──────────────────┐                                     │
//! │  │  LlmProvider (Strategy) │──▶ AgentResponse { content, message }│
//! │  └─────────────────────────┘                                     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between OpenAI, Anthropic,
//! Gemini or any other provider without changing agent logic. Tools reach
//! the agent only through the registry owned by a [`SwarmContext`].

pub mod config;
pub mod context;
pub mod encoding;
pub mod error;
pub mod message;
pub mod middleware;
pub mod provider;
pub mod reasoning;
pub mod registry;
pub mod response;
pub mod tool;

pub use config::LayeredConfig;
pub use context::SwarmContext;
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, MessageMetadata, Role};
pub use middleware::{Middleware, MiddlewareConfig, MiddlewareReply, ToolInvocation};
pub use provider::{
    CompletionStream, FinishReason, GenerationOptions, LlmProvider, StreamAccumulator, TokenUsage,
};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use registry::ToolRegistry;
pub use response::{AgentResponse, ResponseError};
pub use tool::{
    FunctionDefinition, MethodSchema, ParameterSchema, Tool, ToolCall, ToolOutput, ToolResult,
    ToolSchema,
};
