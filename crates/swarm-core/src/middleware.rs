//! Tool-Call Routing Middleware
//!
//! Turns an agent's requested actions into one textual reply:
//! resolve each tool in the registry, run it under a timeout, normalize its
//! output, and join the per-invocation texts with a blank line in request
//! order. A failing invocation yields an error marker in its own slot and
//! never aborts its siblings.
//!
//! Requests use the reserved `mcp` key:
//!
//! ```json
//! {"mcp": {"tool": "filesystem", "method": "read_file", "params": {"path": "notes.txt"}}}
//! {"mcp": {"tool": "bigquery_vector_search", "intent": "find refund policy", "context": "support"}}
//! {"mcp": [{"tool": "a", "method": "run"}, {"tool": "b", "method": "run"}]}
//! ```

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::encoding::normalize_output;
use crate::error::{AgentError, Result};
use crate::registry::ToolRegistry;
use crate::tool::{ToolCall, ToolResult};

/// Reserved key carrying tool requests in agent input
pub const RESERVED_KEY: &str = "mcp";

/// Separator between invocation outputs in the combined reply
pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// What to do with the resolved tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationAction {
    /// Direct call: `method` with `params`
    Method {
        method: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
    /// Intent-based call, resolved by the tool itself
    Intent {
        intent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}

/// One `(tool, method, params)` request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    #[serde(flatten)]
    pub action: InvocationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ToolInvocation {
    pub fn method(
        tool: impl Into<String>,
        method: impl Into<String>,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            tool: tool.into(),
            action: InvocationAction::Method {
                method: method.into(),
                params,
            },
            call_id: None,
        }
    }

    pub fn intent(
        tool: impl Into<String>,
        intent: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            action: InvocationAction::Intent {
                intent: intent.into(),
                context,
            },
            call_id: None,
        }
    }

    /// Map a native vendor tool call onto an invocation.
    ///
    /// Arguments may carry `method`/`params` or `intent`/`context`; anything
    /// else is passed whole as the params of method `run`.
    pub fn from_tool_call(call: &ToolCall) -> Self {
        let args = &call.arguments;

        let action = if let Some(method) = args.get("method").and_then(Value::as_str) {
            let params = args
                .get("params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            InvocationAction::Method {
                method: method.to_string(),
                params,
            }
        } else if let Some(intent) = args.get("intent").and_then(Value::as_str) {
            InvocationAction::Intent {
                intent: intent.to_string(),
                context: args.get("context").map(context_text),
            }
        } else {
            InvocationAction::Method {
                method: "run".into(),
                params: args.clone(),
            }
        };

        Self {
            tool: call.name.clone(),
            action,
            call_id: call.id.clone(),
        }
    }

    /// Parse one request object (`{tool, method, params}` or `{tool, intent, context}`)
    pub fn from_request(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| AgentError::BadRequest("tool request must be a JSON object".into()))?;

        let tool = obj
            .get("tool")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AgentError::BadRequest("missing required field 'tool'".into()))?;

        let call_id = obj.get("id").and_then(Value::as_str).map(str::to_string);

        let action = if let Some(method) = obj.get("method") {
            let method = method
                .as_str()
                .filter(|m| !m.trim().is_empty())
                .ok_or_else(|| {
                    AgentError::BadRequest("'method' must be a non-empty string".into())
                })?;
            let params = match obj.get("params") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(params)) => params.clone(),
                Some(_) => {
                    return Err(AgentError::BadRequest("'params' must be a JSON object".into()));
                }
            };
            InvocationAction::Method {
                method: method.to_string(),
                params,
            }
        } else if let Some(intent) = obj.get("intent") {
            let intent = intent
                .as_str()
                .filter(|i| !i.trim().is_empty())
                .ok_or_else(|| {
                    AgentError::BadRequest("'intent' must be a non-empty string".into())
                })?;
            InvocationAction::Intent {
                intent: intent.to_string(),
                context: obj.get("context").filter(|c| !c.is_null()).map(context_text),
            }
        } else {
            return Err(AgentError::BadRequest(format!(
                "request for tool '{}' needs either 'method' or 'intent'",
                tool
            )));
        };

        Ok(Self {
            tool: tool.to_string(),
            action,
            call_id,
        })
    }

    /// Method name, or `intent` for intent-based calls
    pub fn label(&self) -> &str {
        match &self.action {
            InvocationAction::Method { method, .. } => method,
            InvocationAction::Intent { .. } => "intent",
        }
    }
}

fn context_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Parse agent input of the form `{"mcp": {...}}` or `{"mcp": [{...}, ...]}`.
///
/// Any malformed entry rejects the whole input before anything runs.
pub fn parse_agent_input(input: &Value) -> Result<Vec<ToolInvocation>> {
    let request = input.get(RESERVED_KEY).ok_or_else(|| {
        AgentError::BadRequest(format!("input has no '{}' key", RESERVED_KEY))
    })?;

    match request {
        Value::Array(entries) if entries.is_empty() => Err(AgentError::BadRequest(format!(
            "'{}' holds an empty list",
            RESERVED_KEY
        ))),
        Value::Array(entries) => entries.iter().map(ToolInvocation::from_request).collect(),
        other => Ok(vec![ToolInvocation::from_request(other)?]),
    }
}

/// Find `mcp` requests embedded in assistant text.
///
/// Looks at fenced ```` ```mcp ```` / ```` ```json ```` blocks first, then at a
/// bare JSON object mentioning the reserved key. Unparseable blocks are skipped.
pub fn extract_invocations(content: &str) -> Vec<ToolInvocation> {
    let mut found = Vec::new();

    for fence in ["```mcp", "```json"] {
        let mut rest = content;
        while let Some(start) = rest.find(fence) {
            let after = &rest[start + fence.len()..];
            let Some(end) = after.find("```") else {
                break;
            };
            found.extend(invocations_from_json(after[..end].trim()));
            rest = &after[end + 3..];
        }
    }

    if found.is_empty() && content.contains(&format!("\"{}\"", RESERVED_KEY)) {
        if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
            if start < end {
                found.extend(invocations_from_json(&content[start..=end]));
            }
        }
    }

    found
}

fn invocations_from_json(text: &str) -> Vec<ToolInvocation> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("Skipping tool block that is not valid JSON");
        return Vec::new();
    };

    let parsed = if value.get(RESERVED_KEY).is_some() {
        parse_agent_input(&value)
    } else {
        ToolInvocation::from_request(&value).map(|inv| vec![inv])
    };

    parsed.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "Skipping malformed tool block");
        Vec::new()
    })
}

/// Middleware settings
#[derive(Clone, Debug)]
pub struct MiddlewareConfig {
    /// Time budget for each invocation
    pub timeout: Duration,

    /// Run independent invocations concurrently (output order is unchanged)
    pub parallel: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            parallel: false,
        }
    }
}

/// Combined outcome of one batch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MiddlewareReply {
    /// Per-invocation results, in request order
    pub results: Vec<ToolResult>,

    /// Rendered results joined by a blank line
    pub text: String,
}

impl MiddlewareReply {
    fn from_results(results: Vec<ToolResult>) -> Self {
        let text = results
            .iter()
            .map(ToolResult::render)
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR);
        Self { results, text }
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(ToolResult::is_success)
    }
}

/// Routes tool invocations through the registry
#[derive(Clone, Debug)]
pub struct Middleware {
    registry: ToolRegistry,
    config: MiddlewareConfig,
}

impl Middleware {
    pub fn new(registry: ToolRegistry, config: MiddlewareConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    /// Parse agent input and route it; malformed input runs nothing
    pub async fn handle_agent_input(&self, input: &Value) -> Result<MiddlewareReply> {
        let invocations = parse_agent_input(input)?;
        Ok(self.route(&invocations).await)
    }

    /// Run a batch and join the outputs in request order
    pub async fn route(&self, invocations: &[ToolInvocation]) -> MiddlewareReply {
        tracing::info!(
            count = invocations.len(),
            parallel = self.config.parallel,
            "Routing tool invocations"
        );

        let results = if self.config.parallel {
            futures::future::join_all(invocations.iter().map(|inv| self.invoke(inv))).await
        } else {
            let mut results = Vec::with_capacity(invocations.len());
            for invocation in invocations {
                results.push(self.invoke(invocation).await);
            }
            results
        };

        MiddlewareReply::from_results(results)
    }

    /// Run one invocation; never fails, errors become a failed `ToolResult`
    pub async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        let label = invocation.label().to_string();
        let start = Instant::now();

        let outcome = self.execute(invocation).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(text) => {
                tracing::debug!(
                    tool = %invocation.tool,
                    method = %label,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Tool call succeeded"
                );
                ToolResult::success(&invocation.tool, &label, text)
            }
            Err(err) => {
                tracing::warn!(
                    tool = %invocation.tool,
                    method = %label,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Tool call failed"
                );
                ToolResult::failure(&invocation.tool, &label, &err)
            }
        };

        result
            .with_id(invocation.call_id.clone())
            .with_elapsed(elapsed)
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<String> {
        let tool = self.registry.resolve(&invocation.tool)?;

        let call = async {
            match &invocation.action {
                InvocationAction::Method { method, params } => {
                    tool.validate(method, params)?;
                    tool.call(method, params).await
                }
                InvocationAction::Intent { intent, context } => {
                    tool.call_intent(intent, context.as_deref()).await
                }
            }
        };

        let output = match tokio::time::timeout(
            self.config.timeout,
            AssertUnwindSafe(call).catch_unwind(),
        )
        .await
        {
            Ok(Ok(result)) => result?,
            Ok(Err(_panic)) => {
                return Err(AgentError::ToolExecution(format!(
                    "tool '{}' panicked",
                    invocation.tool
                )));
            }
            Err(_elapsed) => {
                return Err(AgentError::ToolTimeout {
                    id: invocation.tool.clone(),
                    after: self.config.timeout,
                });
            }
        };

        Ok(normalize_output(output))
    }
}
