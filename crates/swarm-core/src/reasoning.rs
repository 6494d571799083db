//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior.
//! The agent asks its provider for a turn, routes any requested tools through
//! the middleware, feeds the results back and repeats until the model answers
//! without asking for tools.
//!
//! The message a provider returns is pushed into the conversation as-is, so
//! tool calls and vendor metadata survive into the next request.

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message, Role};
use crate::middleware::{Middleware, ToolInvocation, extract_invocations};
use crate::provider::{CompletionStream, GenerationOptions, LlmProvider};
use crate::response::AgentResponse;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Maximum reasoning iterations before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Advertise registered tools as native functions to the provider
    pub native_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
            native_tools: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful AI assistant working alongside other agents.

Use the available tools when they help answer the question.
After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate.";

/// Name given to tool messages that carry text-requested (`mcp` block) results
const TEXT_TOOL_RESULTS: &str = "mcp";

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    middleware: Middleware,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        middleware: Middleware,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            middleware,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, middleware: Middleware) -> Self {
        Self::new(provider, middleware, AgentConfig::default())
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();
        let registry = self.middleware.registry();

        if self.config.inject_tool_descriptions && !registry.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&registry.generate_prompt_section());
        }

        prompt
    }

    fn generation_options(&self) -> GenerationOptions {
        let mut options = self.config.generation.clone();
        if self.config.native_tools && options.tools.is_empty() {
            options.tools = self.middleware.registry().function_definitions();
        }
        options
    }

    fn ensure_system_prompt(&self, conversation: &mut Conversation) {
        if conversation.messages().first().map(|m| &m.role) != Some(&Role::System) {
            conversation
                .messages_mut()
                .insert(0, Message::system(self.build_system_prompt()));
        }
    }

    /// Run the agent until the model answers without requesting tools
    pub async fn run(&self, conversation: &mut Conversation) -> Result<AgentResponse> {
        self.ensure_system_prompt(conversation);
        let options = self.generation_options();

        for iteration in 1..=self.config.max_iterations {
            let response = self
                .provider
                .complete(conversation.messages(), &options)
                .await?;

            if !response.is_success() {
                return Ok(response);
            }

            conversation.push(response.message().clone());

            let native = !response.tool_calls().is_empty();
            let invocations: Vec<ToolInvocation> = if native {
                response
                    .tool_calls()
                    .iter()
                    .map(|call| {
                        let mut invocation = ToolInvocation::from_tool_call(call);
                        if invocation.call_id.is_none() {
                            invocation.call_id = Some(uuid::Uuid::new_v4().to_string());
                        }
                        invocation
                    })
                    .collect()
            } else {
                extract_invocations(response.content())
            };

            if invocations.is_empty() {
                tracing::debug!(iteration, provider = self.provider.name(), "Agent finished");
                return Ok(response);
            }

            tracing::info!(
                iteration,
                tools = invocations.len(),
                native,
                "Agent requested tools"
            );

            let reply = self.middleware.route(&invocations).await;

            if native {
                for result in &reply.results {
                    conversation.push(
                        Message::tool(result.render(), result.id.clone()).with_name(&result.tool),
                    );
                }
            } else {
                conversation.push(Message::tool(reply.text, None).with_name(TEXT_TOOL_RESULTS));
            }
        }

        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    /// Run with a simple string input (creates temporary conversation)
    pub async fn ask(&self, question: &str) -> Result<AgentResponse> {
        let mut conversation = Conversation::with_system_prompt(self.build_system_prompt());
        conversation.push(Message::user(question));
        self.run(&mut conversation).await
    }

    /// Like [`Agent::ask`], but failures come back as a failed response
    pub async fn respond(&self, question: &str) -> AgentResponse {
        match self.ask(question).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "Agent run failed");
                AgentResponse::failure(&err)
            }
        }
    }

    /// Stream one provider turn for `question`; tools are not routed
    pub async fn stream(&self, question: &str) -> Result<CompletionStream> {
        let mut conversation = Conversation::with_system_prompt(self.build_system_prompt());
        conversation.push(Message::user(question));
        self.provider
            .complete_stream(conversation.messages(), &self.config.generation)
            .await
    }

    /// Provider backing this agent
    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Middleware routing this agent's tool calls
    pub fn middleware(&self) -> &Middleware {
        &self.middleware
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    middleware: Option<Middleware>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            middleware: None,
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware = Some(middleware);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn native_tools(mut self, enabled: bool) -> Self {
        self.config.native_tools = enabled;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self.provider.ok_or_else(|| {
            AgentError::config("agent", "no provider was set", "call AgentBuilder::provider")
        })?;
        let middleware = self.middleware.ok_or_else(|| {
            AgentError::config(
                "agent",
                "no middleware was set",
                "pass SwarmContext::middleware(..) to AgentBuilder::middleware",
            )
        })?;

        Ok(Agent::new(provider, middleware, self.config))
    }
}
