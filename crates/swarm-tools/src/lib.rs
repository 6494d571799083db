//! # swarm-tools
//!
//! Concrete tools for swarm agents.
//!
//! ## Tools
//!
//! - **`bigquery_vector_search`** - semantic search over a document table.
//!   The table sits behind [`store::VectorStore`]; the in-process
//!   [`store::MemoryVectorStore`] ranks documents by cosine similarity of
//!   hashed bag-of-words embeddings.
//! - **`filesystem`** - read-only file access confined to one root.
//!
//! ```text
//! ┌──────────────┐  invoke   ┌────────────────────────┐   search   ┌──────────────┐
//! │  Middleware  │──────────▶│ BigQueryVectorSearchTool│──────────▶│ VectorStore  │
//! └──────────────┘           └────────────────────────┘            └──────────────┘
//!        │                   ┌────────────────────────┐
//!        └──────────────────▶│     FileSystemTool     │──▶ tokio::fs (under root)
//!                            └────────────────────────┘
//! ```

pub mod embedding;
pub mod error;
pub mod model;
pub mod store;
pub mod svckit;

use serde_json::{Map, Value};
use swarm_core::ToolRegistry;

pub use error::{Result, ToolsError};
pub use model::{DatasetInfo, Document, SearchHit};
pub use store::{MemoryVectorStore, VectorStore};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{
        BigQueryVectorSearchTool, FileSystemConfig, FileSystemTool, VectorSearchConfig,
    };
}

/// Register every tool in this crate.
///
/// Each map is the caller's config block for that tool, layered over
/// defaults and `SWARM_VECTOR_SEARCH_*` / `SWARM_FS_*` variables. Pass
/// `None` for `filesystem` to leave file access out.
pub fn register_default_tools(
    registry: &ToolRegistry,
    vector_search: &Map<String, Value>,
    filesystem: Option<&Map<String, Value>>,
) -> Result<()> {
    let config = tools::VectorSearchConfig::resolve(vector_search)?;
    registry.register(tools::BigQueryVectorSearchTool::from_config(config)?);

    if let Some(overrides) = filesystem {
        let config = tools::FileSystemConfig::resolve(overrides)?;
        registry.register(tools::FileSystemTool::from_config(&config)?);
    }

    tracing::info!(tools = registry.len(), "Registered default tools");
    Ok(())
}

/// System prompt for agents using these tools
pub const SWARM_TOOLS_PROMPT: &str = r#"You are a research assistant with access to a document index and a read-only workspace.

## How to Work

1. Use `bigquery_vector_search` with `similarity_search` to find documents related to the question
2. Use `get_content` on the best hits before quoting them
3. Use `filesystem` to read files the user names; never guess file contents
4. Say so plainly when nothing relevant is found

## Tools Available

- `bigquery_vector_search` - similarity_search, get_content, dataset_info
- `filesystem` - read_file, list_directory

Cite document ids or file paths for every fact you take from a tool."#;
