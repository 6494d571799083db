//! In-process vector store
//!
//! For tests, demos and deployments without a warehouse. Holds documents
//! and their embeddings behind a `tokio::sync::RwLock`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::VectorStore;
use crate::embedding::{HashedEmbedder, MODEL_NAME, cosine};
use crate::error::Result;
use crate::model::{Document, SearchHit};

const SNIPPET_CHARS: usize = 240;

struct Row {
    document: Document,
    embedding: Vec<f32>,
}

/// Vector store kept in memory
pub struct MemoryVectorStore {
    embedder: HashedEmbedder,
    rows: RwLock<HashMap<String, Row>>,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new(HashedEmbedder::default())
    }
}

impl MemoryVectorStore {
    pub fn new(embedder: HashedEmbedder) -> Self {
        Self {
            embedder,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Store pre-filled with `documents`
    pub async fn with_documents(documents: Vec<Document>) -> Result<Self> {
        let store = Self::default();
        store.upsert_all(documents).await?;
        Ok(store)
    }

    /// Same as [`with_documents`](Self::with_documents) without a runtime,
    /// for wiring at startup
    pub fn from_documents(embedder: HashedEmbedder, documents: Vec<Document>) -> Self {
        let rows: HashMap<String, Row> = documents
            .into_iter()
            .map(|document| {
                let row = Row {
                    embedding: embed_document(&embedder, &document),
                    document,
                };
                (row.document.id.clone(), row)
            })
            .collect();
        Self {
            embedder,
            rows: RwLock::new(rows),
        }
    }
}

fn embed_document(embedder: &HashedEmbedder, document: &Document) -> Vec<f32> {
    embedder.embed(&format!("{}\n{}", document.title, document.content))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, document: Document) -> Result<()> {
        let embedding = embed_document(&self.embedder, &document);
        tracing::debug!(document_id = %document.id, "Indexed document");
        self.rows.write().await.insert(
            document.id.clone(),
            Row {
                document,
                embedding,
            },
        );
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed(query);
        let rows = self.rows.read().await;

        let mut scored: Vec<(&Row, f32)> = rows
            .values()
            .map(|row| (row, cosine(&query_embedding, &row.embedding)))
            .filter(|(_, score)| f64::from(*score) >= threshold)
            .collect();

        // ties broken by id so results are stable
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(row, score)| SearchHit {
                document_id: row.document.id.clone(),
                title: row.document.title.clone(),
                score,
                snippet: row.document.snippet(SNIPPET_CHARS),
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.rows.read().await.get(id).map(|row| row.document.clone()))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }

    fn embedding_model(&self) -> &str {
        MODEL_NAME
    }

    fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
