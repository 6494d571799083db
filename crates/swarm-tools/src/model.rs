//! Domain Models
//!
//! Documents stored in a vector table and the hits returned by a search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document row: id, text and free-form attributes
///
/// Deserializing fills a missing `id` with a fresh uuid and a missing
/// `indexed_at` with the current time, so seed files only need text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Row id
    #[serde(default = "new_id")]
    pub id: String,

    /// Short title shown in hits
    pub title: String,

    /// Full text
    pub content: String,

    /// Extra columns
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// When the row was indexed
    #[serde(default = "Utc::now")]
    pub indexed_at: DateTime<Utc>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Document {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            content: content.into(),
            metadata: Map::new(),
            indexed_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// First `max_chars` characters, cut on a word boundary
    pub fn snippet(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            return self.content.clone();
        }
        let cut: String = self.content.chars().take(max_chars).collect();
        let cut = cut.rsplit_once(' ').map_or(cut.as_str(), |(head, _)| head);
        format!("{}…", cut.trim_end())
    }
}

/// One search result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: String,
    pub title: String,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
    pub snippet: String,
}

/// Description of the table behind a vector search tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub backend: String,
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub table_name: Option<String>,
    pub embedding_model: String,
    pub documents: usize,
    pub dimensions: usize,
}
