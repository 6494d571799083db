//! Vector Search Tool
//!
//! Semantic search over a document table. Registered as
//! `bigquery_vector_search`; the table itself sits behind [`VectorStore`].
//!
//! The memory backend is seeded from `documents_path`: a JSON array of
//! documents, or one document per line (JSONL). Only `title` and `content`
//! are required per row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use swarm_core::{
    LayeredConfig, MethodSchema, ParameterSchema, Result as CoreResult, Tool, ToolOutput,
    ToolSchema,
};

use crate::error::{Result, ToolsError};
use crate::embedding::HashedEmbedder;
use crate::model::{DatasetInfo, Document};
use crate::store::{MemoryVectorStore, VectorStore};

pub const TOOL_NAME: &str = "bigquery_vector_search";

/// Config block name used in error messages
pub const CONFIG_LOCATION: &str = "tools.bigquery_vector_search";

/// Environment prefix: `SWARM_VECTOR_SEARCH_MAX_RESULTS` and so on
pub const ENV_PREFIX: &str = "SWARM_VECTOR_SEARCH";

const RECOGNIZED_KEYS: &[&str] = &[
    "project_id",
    "dataset_id",
    "table_name",
    "embedding_model",
    "similarity_threshold",
    "max_results",
    "backend",
    "documents_path",
];

const TEXT_KEYS: &[&str] = &[
    "project_id",
    "dataset_id",
    "table_name",
    "embedding_model",
    "backend",
    "documents_path",
];

/// Hashed bag-of-words cosine rarely exceeds 0.5 for a short query
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.2;

/// Effective settings of the vector search tool
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct VectorSearchConfig {
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub table_name: Option<String>,
    pub embedding_model: Option<String>,
    pub similarity_threshold: f64,
    pub max_results: usize,
    /// `memory` or `bigquery`
    pub backend: String,
    /// JSON or JSONL file loaded into the memory backend
    #[serde(default)]
    pub documents_path: Option<PathBuf>,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset_id: None,
            table_name: None,
            embedding_model: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_results: 50,
            backend: "memory".into(),
            documents_path: None,
        }
    }
}

impl VectorSearchConfig {
    /// Layered builder with defaults applied; add env and overrides on top
    pub fn layered() -> LayeredConfig {
        let defaults = json!({
            "project_id": null,
            "dataset_id": null,
            "table_name": null,
            "embedding_model": null,
            "similarity_threshold": DEFAULT_SIMILARITY_THRESHOLD,
            "max_results": 50,
            "backend": "memory",
            "documents_path": null,
        });
        let defaults = match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        LayeredConfig::new(CONFIG_LOCATION, RECOGNIZED_KEYS)
            .alias("default_similarity_threshold", "similarity_threshold")
            .text_keys(TEXT_KEYS)
            .with_defaults(&defaults)
    }

    /// Defaults, then `SWARM_VECTOR_SEARCH_*` variables, then `overrides`
    pub fn resolve(overrides: &Map<String, Value>) -> Result<Self> {
        Ok(Self::layered()
            .with_env(ENV_PREFIX)
            .with_overrides(overrides)
            .extract()?)
    }

    /// Same as [`resolve`](Self::resolve) with an injected environment
    pub fn resolve_with<F>(overrides: &Map<String, Value>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self::layered()
            .with_env_from(ENV_PREFIX, lookup)
            .with_overrides(overrides)
            .extract()?)
    }
}

/// Tool for semantic document search
pub struct BigQueryVectorSearchTool {
    config: VectorSearchConfig,
    store: Arc<dyn VectorStore>,
}

impl BigQueryVectorSearchTool {
    pub fn new(config: VectorSearchConfig, store: Arc<dyn VectorStore>) -> Self {
        Self { config, store }
    }

    /// Pick the store named by `config.backend`, seeding it from
    /// `config.documents_path` when set
    pub fn from_config(config: VectorSearchConfig) -> Result<Self> {
        let store: Arc<dyn VectorStore> = match config.backend.as_str() {
            "memory" => {
                let documents = match &config.documents_path {
                    Some(path) => load_documents(path)?,
                    None => Vec::new(),
                };
                Arc::new(MemoryVectorStore::from_documents(
                    HashedEmbedder::default(),
                    documents,
                ))
            }
            "bigquery" => {
                return Err(ToolsError::BackendUnavailable {
                    backend: "bigquery".into(),
                    alternative: format!(
                        "set backend = \"memory\" in {CONFIG_LOCATION} \
                         or {ENV_PREFIX}_BACKEND=memory"
                    ),
                });
            }
            other => {
                return Err(ToolsError::InvalidParameter {
                    name: "backend".into(),
                    reason: format!("unknown backend '{other}', expected 'memory' or 'bigquery'"),
                });
            }
        };
        tracing::info!(
            backend = %config.backend,
            threshold = config.similarity_threshold,
            max_results = config.max_results,
            documents_path = ?config.documents_path,
            "Vector search tool configured"
        );
        Ok(Self::new(config, store))
    }

    /// Index more documents; returns the table size afterwards
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<usize> {
        let added = documents.len();
        self.store.upsert_all(documents).await?;
        let total = self.store.count().await?;
        tracing::info!(tool = TOOL_NAME, added, total, "Documents indexed");
        Ok(total)
    }

    pub fn config(&self) -> &VectorSearchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    async fn similarity_search(&self, query: &str, limit: usize, threshold: f64) -> Result<Value> {
        if query.trim().is_empty() {
            return Err(ToolsError::InvalidQuery("query must not be empty".into()));
        }
        let limit = limit.clamp(1, self.config.max_results.max(1));
        let hits = self.store.search(query, limit, threshold).await?;

        tracing::debug!(
            tool = TOOL_NAME,
            hits = hits.len(),
            limit,
            threshold,
            "Similarity search finished"
        );

        Ok(json!({
            "query": query,
            "similarity_threshold": threshold,
            "results": hits,
        }))
    }

    async fn dataset_info(&self) -> Result<DatasetInfo> {
        Ok(DatasetInfo {
            backend: self.store.name().to_string(),
            project_id: self.config.project_id.clone(),
            dataset_id: self.config.dataset_id.clone(),
            table_name: self.config.table_name.clone(),
            embedding_model: self
                .config
                .embedding_model
                .clone()
                .unwrap_or_else(|| self.store.embedding_model().to_string()),
            documents: self.store.count().await?,
            dimensions: self.store.dimensions(),
        })
    }

    async fn dispatch(&self, method: &str, params: &Map<String, Value>) -> Result<ToolOutput> {
        match method {
            "similarity_search" => {
                let query = string_param(params, "query")?;
                let limit = optional_usize(params, "limit")?.unwrap_or(self.config.max_results);
                let threshold = optional_threshold(params, "similarity_threshold")?
                    .unwrap_or(self.config.similarity_threshold);
                Ok(self.similarity_search(query, limit, threshold).await?.into())
            }
            "get_content" => {
                let id = string_param(params, "document_id")?;
                let document = self
                    .store
                    .get(id)
                    .await?
                    .ok_or_else(|| ToolsError::DocumentNotFound(id.to_string()))?;
                Ok(ToolOutput::Json(serde_json::to_value(document)?))
            }
            "dataset_info" => Ok(ToolOutput::Json(serde_json::to_value(
                self.dataset_info().await?,
            )?)),
            other => Err(ToolsError::InvalidParameter {
                name: "method".into(),
                reason: format!("unknown method '{other}'"),
            }),
        }
    }
}

#[async_trait]
impl Tool for BigQueryVectorSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.into(),
            description: "Semantic search over an indexed document table. Find documents similar to a question, then fetch full text by id.".into(),
            methods: vec![
                MethodSchema {
                    name: "similarity_search".into(),
                    description: "Return the documents most similar to the query, best first".into(),
                    parameters: vec![
                        ParameterSchema::required("query", "string", "Text to search for"),
                        ParameterSchema::optional(
                            "limit",
                            "number",
                            "Maximum number of results",
                            Some(json!(self.config.max_results)),
                        ),
                        ParameterSchema::optional(
                            "similarity_threshold",
                            "number",
                            "Minimum cosine similarity between -1 and 1",
                            Some(json!(self.config.similarity_threshold)),
                        ),
                    ],
                },
                MethodSchema {
                    name: "get_content".into(),
                    description: "Fetch the full document by id".into(),
                    parameters: vec![ParameterSchema::required(
                        "document_id",
                        "string",
                        "Id from a search result",
                    )],
                },
                MethodSchema {
                    name: "dataset_info".into(),
                    description: "Describe the table: backend, size and embedding model".into(),
                    parameters: Vec::new(),
                },
            ],
            accepts_intents: true,
            category: Some("search".into()),
        }
    }

    async fn call(&self, method: &str, params: &Map<String, Value>) -> CoreResult<ToolOutput> {
        Ok(self.dispatch(method, params).await?)
    }

    async fn call_intent(&self, intent: &str, context: Option<&str>) -> CoreResult<ToolOutput> {
        let query = match context {
            Some(context) if !context.trim().is_empty() => format!("{intent}\n{context}"),
            _ => intent.to_string(),
        };
        let result = self
            .similarity_search(&query, self.config.max_results, self.config.similarity_threshold)
            .await?;
        Ok(result.into())
    }
}

fn string_param<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolsError::InvalidParameter {
            name: name.into(),
            reason: "expected a string".into(),
        })
}

fn optional_usize(params: &Map<String, Value>, name: &str) -> Result<Option<usize>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ToolsError::InvalidParameter {
                name: name.into(),
                reason: "expected a positive integer".into(),
            }),
    }
}

fn optional_threshold(params: &Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|v| (-1.0..=1.0).contains(v))
            .map(Some)
            .ok_or_else(|| ToolsError::InvalidParameter {
                name: name.into(),
                reason: "expected a number between -1 and 1".into(),
            }),
    }
}

/// Read a seed file: a JSON array of documents or JSONL
fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path).map_err(|err| ToolsError::InvalidParameter {
        name: "documents_path".into(),
        reason: format!("cannot read {}: {err}", path.display()),
    })?;

    let documents = if raw.trim_start().starts_with('[') {
        serde_json::from_str(&raw)?
    } else {
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<Document>, _>>()?
    };

    tracing::info!(
        path = %path.display(),
        documents = documents.len(),
        "Loaded vector search documents"
    );
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use swarm_core::AgentError;

    use super::*;
    use crate::model::Document;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    async fn tool() -> BigQueryVectorSearchTool {
        let store = MemoryVectorStore::with_documents(vec![
            Document::new("Refund policy", "Refund requests are accepted within 30 days of purchase.")
                .with_id("doc-refunds"),
            Document::new("Shipping", "Orders ship from Gothenburg within two business days.")
                .with_id("doc-shipping"),
        ])
        .await
        .unwrap();
        let config = VectorSearchConfig {
            similarity_threshold: 0.1,
            ..VectorSearchConfig::default()
        };
        BigQueryVectorSearchTool::new(config, Arc::new(store))
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let config = VectorSearchConfig::resolve_with(
            &object(json!({"similarity_threshold": 0.3, "max_results": 10, "region": "eu"})),
            |_| None,
        )
        .unwrap();
        assert!((config.similarity_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.max_results, 10);
        assert_eq!(config.project_id, None);
        assert_eq!(config.backend, "memory");
    }

    #[test]
    fn test_env_layer_and_alias() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SWARM_VECTOR_SEARCH_PROJECT_ID", "acme-prod"),
            ("SWARM_VECTOR_SEARCH_MAX_RESULTS", "25"),
        ]);
        let config = VectorSearchConfig::resolve_with(
            &object(json!({"default_similarity_threshold": 0.5})),
            |name| env.get(name).map(|v| (*v).to_string()),
        )
        .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("acme-prod"));
        assert_eq!(config.max_results, 25);
        assert!((config.similarity_threshold - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_numeric_project_id_from_env_stays_text() {
        let config = VectorSearchConfig::resolve_with(&Map::new(), |name| {
            (name == "SWARM_VECTOR_SEARCH_PROJECT_ID").then(|| "123456789".to_string())
        })
        .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("123456789"));
    }

    #[tokio::test]
    async fn test_threshold_echo_is_exact() {
        let tool = BigQueryVectorSearchTool::from_config(VectorSearchConfig::default()).unwrap();
        let params = object(json!({"query": "anything"}));
        let ToolOutput::Json(result) = tool.call("similarity_search", &params).await.unwrap() else {
            panic!("expected json output");
        };
        assert_eq!(result["similarity_threshold"], json!(DEFAULT_SIMILARITY_THRESHOLD));
        assert_eq!(result["similarity_threshold"].to_string(), "0.2");
    }

    #[tokio::test]
    async fn test_documents_path_seeds_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        let refunds = json!({
            "id": "doc-refunds",
            "title": "Refund policy",
            "content": "Refund requests are accepted within 30 days of purchase.",
        });
        let shipping = json!({
            "title": "Shipping",
            "content": "Orders ship from Gothenburg within two business days.",
        });
        // blank lines between rows are skipped
        std::fs::write(&path, format!("{refunds}\n\n{shipping}\n")).unwrap();

        let config = VectorSearchConfig::resolve_with(
            &object(json!({"documents_path": path.display().to_string()})),
            |_| None,
        )
        .unwrap();
        let tool = BigQueryVectorSearchTool::from_config(config).unwrap();
        assert_eq!(tool.store().count().await.unwrap(), 2);

        // the default threshold admits an ordinary question
        let params = object(json!({"query": "how do refund requests work"}));
        let ToolOutput::Json(result) = tool.call("similarity_search", &params).await.unwrap() else {
            panic!("expected json output");
        };
        assert_eq!(result["results"][0]["document_id"], "doc-refunds");
    }

    #[test]
    fn test_documents_path_json_array_and_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        let rows = json!([
            {"title": "A", "content": "alpha"},
            {"title": "B", "content": "beta"},
        ]);
        std::fs::write(&path, rows.to_string()).unwrap();
        assert_eq!(load_documents(&path).unwrap().len(), 2);

        let err = load_documents(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(
            err,
            ToolsError::InvalidParameter { ref name, .. } if name == "documents_path"
        ));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_documents(&path), Err(ToolsError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_add_documents_grows_table() {
        let tool = tool().await;
        let total = tool
            .add_documents(vec![Document::new("Security", "Passwords are hashed with argon2.")])
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_wrong_type_is_invalid_config() {
        let overrides = object(json!({"max_results": "lots"}));
        let err = VectorSearchConfig::resolve_with(&overrides, |_| None).unwrap_err();
        let err = AgentError::from(err);
        assert!(matches!(
            err,
            AgentError::InvalidConfig { ref location, .. } if location == CONFIG_LOCATION
        ));
    }

    #[test]
    fn test_bigquery_backend_reports_alternative() {
        let config = VectorSearchConfig {
            backend: "bigquery".into(),
            ..VectorSearchConfig::default()
        };
        let err = AgentError::from(BigQueryVectorSearchTool::from_config(config).err().unwrap());
        assert_eq!(err.status_code(), 503);
        assert!(err.to_string().contains("backend = \"memory\""));
    }

    #[tokio::test]
    async fn test_similarity_search_returns_ranked_hits() {
        let tool = tool().await;
        let params = object(json!({"query": "refund requests", "limit": 1}));
        let ToolOutput::Json(result) = tool.call("similarity_search", &params).await.unwrap() else {
            panic!("expected json output");
        };
        let results = result["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["document_id"], "doc-refunds");
    }

    #[tokio::test]
    async fn test_get_content_and_missing_document() {
        let tool = tool().await;
        let ToolOutput::Json(doc) = tool
            .call("get_content", &object(json!({"document_id": "doc-shipping"})))
            .await
            .unwrap()
        else {
            panic!("expected json output");
        };
        assert_eq!(doc["title"], "Shipping");

        let err = tool
            .call("get_content", &object(json!({"document_id": "nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(_)));
    }

    #[tokio::test]
    async fn test_bad_parameters_are_validation_errors() {
        let tool = tool().await;
        let err = tool
            .call("similarity_search", &object(json!({"query": "x", "similarity_threshold": 3})))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = tool
            .call("similarity_search", &object(json!({"query": "   "})))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_intent_searches_intent_and_context() {
        let tool = tool().await;
        let ToolOutput::Json(result) = tool
            .call_intent("where do orders ship from", Some("business days"))
            .await
            .unwrap()
        else {
            panic!("expected json output");
        };
        assert_eq!(result["results"][0]["document_id"], "doc-shipping");
    }

    #[tokio::test]
    async fn test_dataset_info_reports_store() {
        let tool = tool().await;
        let ToolOutput::Json(info) = tool.call("dataset_info", &Map::new()).await.unwrap() else {
            panic!("expected json output");
        };
        assert_eq!(info["backend"], "memory");
        assert_eq!(info["documents"], 2);
        assert_eq!(info["embedding_model"], crate::embedding::MODEL_NAME);
    }
}
