//! Service Kit - Agent Tools
//!
//! Concrete tools that implement `swarm_core::Tool`.

pub mod filesystem;
pub mod vector_search;

pub use filesystem::{FileSystemConfig, FileSystemTool};
pub use vector_search::{BigQueryVectorSearchTool, VectorSearchConfig};
