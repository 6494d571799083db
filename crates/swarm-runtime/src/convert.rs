//! Helpers shared by the vendor message converters

use serde_json::{Map, Value};
use swarm_core::message::{Message, Role};

/// Prefix for tool results that have no vendor call id to attach to
pub const TOOL_RESULTS_HEADER: &str = "Tool results:";

/// Parse vendor-encoded function arguments.
///
/// Empty strings give an empty map; text that is not a JSON object is kept
/// under `_raw` so the tool reports a validation error back to the model.
pub fn parse_arguments(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::debug!(len = raw.len(), "Function arguments are not a JSON object");
            let mut map = Map::new();
            map.insert("_raw".into(), Value::String(raw.to_string()));
            map
        }
    }
}

/// Tool messages with a vendor call id are sent as native tool results
pub fn is_native_tool_result(message: &Message) -> bool {
    message.role == Role::Tool && message.metadata.tool_call_id.is_some()
}

/// Text form of a tool message sent as a plain user turn
pub fn tool_results_text(message: &Message) -> String {
    format!("{TOOL_RESULTS_HEADER}\n\n{}", message.content)
}

/// All system messages joined, for vendors that take the prompt separately
pub fn system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}
