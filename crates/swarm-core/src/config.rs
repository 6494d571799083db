//! Layered Configuration
//!
//! Tool settings are resolved from three layers, later layers winning:
//! defaults, then environment variables, then the map supplied by the caller.
//! The set of recognized keys is declared once per tool. Recognized keys
//! supplied by the caller always reach the effective configuration;
//! unrecognized keys are ignored.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Builder for one tool's effective configuration
#[derive(Clone, Debug)]
pub struct LayeredConfig {
    location: String,
    recognized: Vec<String>,
    text_keys: Vec<String>,
    aliases: Vec<(String, String)>,
    defaults: Map<String, Value>,
    env: Map<String, Value>,
    explicit: Map<String, Value>,
}

impl LayeredConfig {
    /// `location` names the config block in error messages (e.g. `tools.filesystem`)
    pub fn new(location: impl Into<String>, recognized: &[&str]) -> Self {
        Self {
            location: location.into(),
            recognized: recognized.iter().map(|k| (*k).to_string()).collect(),
            text_keys: Vec::new(),
            aliases: Vec::new(),
            defaults: Map::new(),
            env: Map::new(),
            explicit: Map::new(),
        }
    }

    /// Accept `alias` as another spelling of `canonical`
    pub fn alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases.push((alias.to_string(), canonical.to_string()));
        self
    }

    /// Keys whose environment value is always taken as a string
    /// (`PROJECT_ID=123456789` stays `"123456789"`)
    pub fn text_keys(mut self, keys: &[&str]) -> Self {
        self.text_keys.extend(keys.iter().map(|k| (*k).to_string()));
        self
    }

    /// Recognized keys, in declaration order
    pub fn recognized_keys(&self) -> &[String] {
        &self.recognized
    }

    fn canonical(&self, key: &str) -> Option<&str> {
        if let Some(known) = self.recognized.iter().find(|k| *k == key) {
            return Some(known.as_str());
        }
        self.aliases
            .iter()
            .find(|(alias, _)| alias == key)
            .map(|(_, canonical)| canonical.as_str())
    }

    fn layer(&self, source: &Map<String, Value>, layer: &str) -> Map<String, Value> {
        let mut out = Map::new();

        // aliases first so that the canonical spelling wins within one layer
        for (key, value) in source {
            if self.recognized.contains(key) {
                continue;
            }
            match self.canonical(key) {
                Some(canonical) => {
                    out.insert(canonical.to_string(), value.clone());
                }
                None => {
                    tracing::debug!(
                        config = %self.location,
                        layer,
                        key = %key,
                        "Ignoring unrecognized configuration key"
                    );
                }
            }
        }
        for (key, value) in source {
            if self.recognized.contains(key) {
                out.insert(key.clone(), value.clone());
            }
        }

        out
    }

    /// Default layer
    pub fn with_defaults(mut self, defaults: &Map<String, Value>) -> Self {
        self.defaults = self.layer(defaults, "defaults");
        self
    }

    /// Environment layer from the process environment
    pub fn with_env(self, prefix: &str) -> Self {
        self.with_env_from(prefix, |name| std::env::var(name).ok())
    }

    /// Environment layer from an arbitrary lookup; variables are named
    /// `{PREFIX}_{KEY}` in upper case. Values of [`text_keys`](Self::text_keys)
    /// are kept as strings; others are parsed as JSON when they parse,
    /// otherwise kept as strings.
    pub fn with_env_from<F>(mut self, prefix: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Map::new();
        for key in &self.recognized {
            let name = format!("{}_{}", prefix, key).to_uppercase();
            if let Some(raw) = lookup(&name) {
                let value = if self.text_keys.contains(key) {
                    Value::String(raw)
                } else {
                    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                };
                tracing::debug!(
                    config = %self.location,
                    variable = %name,
                    "Applied environment override"
                );
                env.insert(key.clone(), value);
            }
        }
        self.env = env;
        self
    }

    /// Caller-supplied layer
    pub fn with_overrides(mut self, overrides: &Map<String, Value>) -> Self {
        self.explicit = self.layer(overrides, "explicit");
        self
    }

    /// Effective configuration: every recognized key, `null` when no layer sets it
    pub fn resolve(&self) -> Map<String, Value> {
        self.recognized
            .iter()
            .map(|key| {
                let value = self
                    .explicit
                    .get(key)
                    .or_else(|| self.env.get(key))
                    .or_else(|| self.defaults.get(key))
                    .cloned()
                    .unwrap_or(Value::Null);
                (key.clone(), value)
            })
            .collect()
    }

    /// Deserialize the effective configuration into a typed struct
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.resolve())).map_err(|err| {
            AgentError::config(
                &self.location,
                err.to_string(),
                format!(
                    "check the value types of the recognized keys: {}",
                    self.recognized.join(", ")
                ),
            )
        })
    }
}
