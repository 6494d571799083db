//! Error Types for Swarm Tools

use std::path::PathBuf;

use swarm_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolsError>;

#[derive(Error, Debug)]
pub enum ToolsError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Path '{}' escapes the tool root", .0.display())]
    PathEscape(PathBuf),

    #[error("No such file or directory: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("File {} is {size} bytes, above the {limit} byte limit", .path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Backend '{backend}' is not available in this build")]
    BackendUnavailable { backend: String, alternative: String },

    #[error("Configuration error: {0}")]
    Config(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ToolsError> for AgentError {
    fn from(err: ToolsError) -> Self {
        match err {
            ToolsError::DocumentNotFound(_)
            | ToolsError::PathNotFound(_)
            | ToolsError::FileTooLarge { .. } => AgentError::ToolExecution(err.to_string()),
            ToolsError::InvalidQuery(_)
            | ToolsError::InvalidParameter { .. }
            | ToolsError::PathEscape(_) => AgentError::ToolValidation(err.to_string()),
            ToolsError::BackendUnavailable {
                backend,
                alternative,
            } => AgentError::CapabilityUnavailable {
                capability: format!("The '{backend}' vector search backend"),
                install: "a build with a BigQuery client wired into VectorStore".into(),
                alternative: Some(alternative),
            },
            ToolsError::Config(inner) => inner,
            ToolsError::Io(inner) => AgentError::Io(inner),
            ToolsError::Serialization(inner) => AgentError::Json(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_status_classes() {
        let escape: AgentError = ToolsError::PathEscape("../etc/passwd".into()).into();
        assert_eq!(escape.status_code(), 400);

        let missing: AgentError = ToolsError::DocumentNotFound("doc-1".into()).into();
        assert_eq!(missing.status_code(), 500);

        let backend: AgentError = ToolsError::BackendUnavailable {
            backend: "bigquery".into(),
            alternative: "backend = \"memory\"".into(),
        }
        .into();
        assert!(matches!(backend, AgentError::CapabilityUnavailable { .. }));
        assert!(backend.to_string().contains("backend = \"memory\""));
    }
}
