//! API key resolution
//!
//! Lookups go through an injectable function so adapters can be built in
//! tests without touching the process environment.

use std::sync::Arc;

use swarm_core::error::{AgentError, Result};

/// Variable name -> value
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the process environment
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// First non-empty value among `variables`, trimmed
pub fn optional(lookup: &EnvLookup, variables: &[&str]) -> Option<String> {
    variables.iter().find_map(|name| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Like [`optional`], but a missing key names the first variable and how to set it
pub fn require(lookup: &EnvLookup, provider: &str, variables: &[&str]) -> Result<String> {
    optional(lookup, variables).ok_or_else(|| {
        tracing::warn!(
            provider,
            variable = variables.first().copied().unwrap_or_default(),
            "API key not set"
        );
        AgentError::MissingCredential {
            provider: provider.to_string(),
            variable: variables.first().copied().unwrap_or_default().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> EnvLookup {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Arc::new(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_fallback_variable() {
        let env = lookup(&[("GEMINI_API_KEY", "  "), ("GOOGLE_API_KEY", "g-key")]);
        assert_eq!(
            require(&env, "Gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]).unwrap(),
            "g-key"
        );
    }

    #[test]
    fn test_missing_names_first_variable() {
        let err = require(&lookup(&[]), "Anthropic", &["ANTHROPIC_API_KEY"]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("ANTHROPIC_API_KEY"));
        assert!(text.contains(".env"));
        assert_eq!(err.status_code(), 401);
    }
}
