//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered at startup in the shared [`ToolRegistry`](crate::registry::ToolRegistry)
//! and invoked by the routing middleware with a method name and parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Optional call ID for tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Raw output of a tool handler, before normalization
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    /// Already-decoded text
    Text(String),
    /// Undecoded bytes (file contents, subprocess output)
    Bytes(Vec<u8>),
    /// Structured result
    Json(Value),
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for ToolOutput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default,
        }
    }
}

/// One callable method of a tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

/// Tool definition schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Methods the tool exposes
    pub methods: Vec<MethodSchema>,

    /// Whether the tool accepts intent-based calls
    #[serde(default)]
    pub accepts_intents: bool,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,
}

impl ToolSchema {
    pub fn method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Vendor-neutral function declaration (JSON Schema parameters)
    pub fn function_definition(&self) -> FunctionDefinition {
        let method_names: Vec<Value> = self
            .methods
            .iter()
            .map(|m| Value::String(m.name.clone()))
            .collect();

        let mut method_docs = String::new();
        for method in &self.methods {
            method_docs.push_str(&format!("\n- {}: {}", method.name, method.description));
            for param in &method.parameters {
                let required = if param.required { ", required" } else { "" };
                method_docs.push_str(&format!(
                    "\n    - {} ({}{}): {}",
                    param.name, param.param_type, required, param.description
                ));
            }
        }

        let mut properties = Map::new();
        properties.insert(
            "method".into(),
            serde_json::json!({
                "type": "string",
                "enum": method_names,
                "description": "Method to call",
            }),
        );
        properties.insert(
            "params".into(),
            serde_json::json!({
                "type": "object",
                "description": "Parameters for the chosen method",
            }),
        );
        let mut required = vec![Value::String("method".into())];
        if self.accepts_intents {
            properties.insert(
                "intent".into(),
                serde_json::json!({
                    "type": "string",
                    "description": "Natural-language goal, used instead of method/params",
                }),
            );
            properties.insert(
                "context".into(),
                serde_json::json!({
                    "type": "string",
                    "description": "Extra context for the intent",
                }),
            );
            required.clear();
        }

        FunctionDefinition {
            name: self.name.clone(),
            description: format!("{}\nMethods:{}", self.description, method_docs),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Function declaration handed to providers for native tool calling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema; `schema().name` is the registry id
    fn schema(&self) -> ToolSchema;

    /// Execute `method` with `params`
    async fn call(&self, method: &str, params: &Map<String, Value>) -> Result<ToolOutput>;

    /// Execute a natural-language intent
    async fn call_intent(&self, intent: &str, context: Option<&str>) -> Result<ToolOutput> {
        let _ = (intent, context);
        Err(AgentError::ToolValidation(format!(
            "Tool '{}' does not accept intent-based calls; use method/params",
            self.schema().name
        )))
    }

    /// Validate a method call before execution
    fn validate(&self, method: &str, params: &Map<String, Value>) -> Result<()> {
        let schema = self.schema();

        let Some(method_schema) = schema.method(method) else {
            let known: Vec<&str> = schema.methods.iter().map(|m| m.name.as_str()).collect();
            return Err(AgentError::ToolValidation(format!(
                "Unknown method '{}' for tool '{}'. Known methods: {}",
                method,
                schema.name,
                known.join(", ")
            )));
        };

        for param in &method_schema.parameters {
            if param.required && !params.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Outcome status of one invocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Failed { status: u16 },
}

/// Result from tool execution, after normalization
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub tool: String,

    /// Method name, or `intent` for intent-based calls
    pub method: String,

    /// Call ID (if provided in request)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Whether execution succeeded
    pub status: InvocationStatus,

    /// Normalized output, or the error message
    pub output: String,

    /// Wall time spent in the handler
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn success(
        tool: impl Into<String>,
        method: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            method: method.into(),
            id: None,
            status: InvocationStatus::Success,
            output: output.into(),
            elapsed_ms: 0,
        }
    }

    pub fn failure(tool: impl Into<String>, method: impl Into<String>, error: &AgentError) -> Self {
        Self {
            tool: tool.into(),
            method: method.into(),
            id: None,
            status: InvocationStatus::Failed {
                status: error.status_code(),
            },
            output: error.to_string(),
            elapsed_ms: 0,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Success
    }

    /// Text placed in this invocation's slot of the combined reply
    pub fn render(&self) -> String {
        match self.status {
            InvocationStatus::Success => self.output.clone(),
            InvocationStatus::Failed { status } => format!(
                "[{}.{}] error {}: {}",
                self.tool, self.method, status, self.output
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo text back".into(),
                methods: vec![MethodSchema {
                    name: "say".into(),
                    description: "Return the text".into(),
                    parameters: vec![ParameterSchema::required("text", "string", "Text to echo")],
                }],
                accepts_intents: false,
                category: None,
            }
        }

        async fn call(&self, _method: &str, params: &Map<String, Value>) -> Result<ToolOutput> {
            Ok(params
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .into())
        }
    }

    #[test]
    fn test_validate_unknown_method_and_missing_param() {
        let err = Echo.validate("shout", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("Known methods: say"));

        let err = Echo.validate("say", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("Missing required parameter: text"));

        let mut params = Map::new();
        params.insert("text".into(), Value::from("hi"));
        assert!(Echo.validate("say", &params).is_ok());
    }

    #[tokio::test]
    async fn test_intent_rejected_by_default() {
        let err = Echo.call_intent("say hi", None).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[test]
    fn test_function_definition_lists_methods() {
        let def = Echo.schema().function_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["properties"]["method"]["enum"][0], "say");
        assert!(def.description.contains("text (string, required)"));
    }

    #[test]
    fn test_failure_renders_marker() {
        let err = AgentError::ToolTimeout {
            id: "echo".into(),
            after: std::time::Duration::from_secs(2),
        };
        let result = ToolResult::failure("echo", "say", &err);
        assert!(!result.is_success());
        assert_eq!(result.render(), "[echo.say] error 504: Tool 'echo' timed out after 2s");
    }
}
