//! Tool Registry
//!
//! One catalog of tool handlers per process. A `ToolRegistry` value is a
//! handle: clones share the same map, so a registration made through any
//! handle is visible through every other one.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::{AgentError, Result};
use crate::tool::{FunctionDefinition, Tool, ToolSchema};

static SHARED: OnceLock<ToolRegistry> = OnceLock::new();

/// Handle to a tool catalog
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.all_ids())
            .finish()
    }
}

impl ToolRegistry {
    /// Handle to the process-wide registry.
    ///
    /// The map is created on the first call only; later calls return a
    /// handle to the same state and never reset existing registrations.
    pub fn shared() -> Self {
        SHARED
            .get_or_init(|| {
                tracing::debug!("Initializing process-wide tool registry");
                Self::detached()
            })
            .clone()
    }

    /// A registry that does not share state with [`ToolRegistry::shared`].
    /// Only [`SwarmContext`](crate::context::SwarmContext) creates these.
    pub(crate) fn detached() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether two handles point at the same catalog
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tools, &other.tools)
    }

    /// Register a tool, replacing any tool with the same id
    pub fn register<T: Tool + 'static>(&self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let id = tool.schema().name;
        let replaced = self
            .tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tool)
            .is_some();

        if replaced {
            tracing::info!(tool = %id, "Replaced registered tool");
        } else {
            tracing::debug!(tool = %id, "Registered tool");
        }
    }

    /// Remove a tool
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Get a tool by id, reporting the registered ids when it is missing
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Tool>> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);

        tools.get(id).cloned().ok_or_else(|| {
            let mut available: Vec<String> = tools.keys().cloned().collect();
            available.sort();
            tracing::warn!(tool = %id, available = ?available, "Tool lookup failed");
            AgentError::ToolNotFound {
                id: id.to_string(),
                available,
            }
        })
    }

    /// Check if a tool exists
    pub fn contains(&self, id: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// All registered ids
    pub fn all_ids(&self) -> BTreeSet<String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Get all tool schemas, ordered by id
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut schemas: Vec<ToolSchema> = tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Function declarations for native tool calling
    pub fn function_definitions(&self) -> Vec<FunctionDefinition> {
        self.schemas()
            .iter()
            .map(ToolSchema::function_definition)
            .collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str("Call a tool by responding with a JSON block:\n\n");
        prompt.push_str(
            "```mcp\n{\"mcp\": {\"tool\": \"tool_id\", \"method\": \"method_name\", \"params\": {\"arg\": \"value\"}}}\n```\n\n",
        );

        for schema in self.schemas() {
            prompt.push_str(&format!("### {}\n", schema.name));
            prompt.push_str(&format!("{}\n", schema.description));

            for method in &schema.methods {
                prompt.push_str(&format!("- `{}`: {}\n", method.name, method.description));
                for param in &method.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "  - `{}` ({}){}: {}\n",
                        param.name, param.param_type, required, param.description
                    ));
                }
            }
            if schema.accepts_intents {
                prompt.push_str("- accepts `intent` + `context` instead of method/params\n");
            }
            prompt.push('\n');
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;
    use crate::tool::{MethodSchema, ToolOutput};

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.0.into(),
                description: format!("{} tool", self.0),
                methods: vec![MethodSchema {
                    name: "run".into(),
                    description: "Run it".into(),
                    parameters: vec![],
                }],
                accepts_intents: false,
                category: None,
            }
        }

        async fn call(&self, _method: &str, _params: &Map<String, Value>) -> Result<ToolOutput> {
            Ok(ToolOutput::Text(self.0.to_string()))
        }
    }

    #[test]
    fn test_shared_handles_see_each_other() {
        let a = ToolRegistry::shared();
        a.register(Named("registry_test_bigquery_vector_search"));

        let b = ToolRegistry::shared();
        assert!(a.same_as(&b));
        assert!(b.all_ids().contains("registry_test_bigquery_vector_search"));

        // A third construction must not wipe what is already there
        let c = ToolRegistry::shared();
        assert!(c.contains("registry_test_bigquery_vector_search"));
    }

    #[test]
    fn test_detached_is_isolated() {
        let detached = ToolRegistry::detached();
        detached.register(Named("only_here"));
        assert!(!ToolRegistry::shared().contains("only_here"));
        assert!(!detached.same_as(&ToolRegistry::shared()));
    }

    #[test]
    fn test_resolve_missing_lists_ids() {
        let registry = ToolRegistry::detached();
        registry.register(Named("beta"));
        registry.register(Named("alpha"));

        match registry.resolve("gamma") {
            Err(AgentError::ToolNotFound { id, available }) => {
                assert_eq!(id, "gamma");
                assert_eq!(available, vec!["alpha".to_string(), "beta".to_string()]);
            }
            other => panic!("expected ToolNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_register_replaces_and_clone_shares() {
        let registry = ToolRegistry::detached();
        let handle = registry.clone();
        registry.register(Named("alpha"));
        handle.register(Named("alpha"));

        assert_eq!(registry.len(), 1);
        assert!(handle.unregister("alpha").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prompt_section_mentions_methods() {
        let registry = ToolRegistry::detached();
        registry.register(Named("alpha"));
        let section = registry.generate_prompt_section();
        assert!(section.contains("### alpha"));
        assert!(section.contains("- `run`: Run it"));
        assert_eq!(registry.function_definitions().len(), 1);
    }
}
