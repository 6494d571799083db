//! Application State

use std::sync::Arc;

use swarm_core::{
    Agent, AgentBuilder, LlmProvider, Middleware, MiddlewareConfig, Result, SwarmContext,
};

use crate::config::ServerConfig;

/// Builds the provider for a model name
pub type ProviderFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn LlmProvider>> + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Owner of the tool registry
    pub context: SwarmContext,

    /// Router for tool invocations
    pub middleware: Middleware,

    /// Provider lookup by model (vendor inferred from the name)
    pub providers: ProviderFactory,

    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(context: SwarmContext, config: ServerConfig, providers: ProviderFactory) -> Self {
        let middleware = context.middleware(MiddlewareConfig {
            timeout: config.tool_timeout,
            parallel: config.parallel_tools,
        });
        Self {
            context,
            middleware,
            providers,
            config: Arc::new(config),
        }
    }

    /// Model to use for a request
    pub fn model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.config.default_model.as_str())
    }

    /// Agent for one request
    pub fn agent(&self, model: &str, system_prompt: Option<&str>) -> Result<Agent> {
        let provider = (self.providers)(model)?;
        let mut builder = AgentBuilder::new()
            .provider(provider)
            .middleware(self.middleware.clone())
            .model(model)
            .max_iterations(self.config.max_iterations);
        if let Some(prompt) = system_prompt {
            builder = builder.system_prompt(prompt);
        }
        builder.build()
    }
}
