//! Vector Store Backends
//!
//! Abstractions and implementations for the document table behind
//! `bigquery_vector_search`.

mod memory;

pub use memory::MemoryVectorStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Document, SearchHit};

/// Vector store trait (Strategy pattern)
///
/// Implement this for each backend: BigQuery, pgvector, an in-process table.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a document by id
    async fn upsert(&self, document: Document) -> Result<()>;

    /// Insert many documents
    async fn upsert_all(&self, documents: Vec<Document>) -> Result<()> {
        for document in documents {
            self.upsert(document).await?;
        }
        Ok(())
    }

    /// Best matches for `query`, highest score first, at or above `threshold`
    async fn search(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>>;

    /// Full document by id
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Number of stored documents
    async fn count(&self) -> Result<usize>;

    /// Embedding model used for queries
    fn embedding_model(&self) -> &str;

    /// Embedding width
    fn dimensions(&self) -> usize;

    /// Backend name
    fn name(&self) -> &str;
}
