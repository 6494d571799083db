//! Filesystem Tool
//!
//! Read-only access to files under one root directory. File contents are
//! returned as raw bytes and decoded by the middleware.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use swarm_core::{
    LayeredConfig, MethodSchema, ParameterSchema, Result as CoreResult, Tool, ToolOutput,
    ToolSchema,
};

use crate::error::{Result, ToolsError};

pub const TOOL_NAME: &str = "filesystem";

pub const CONFIG_LOCATION: &str = "tools.filesystem";

/// Environment prefix: `SWARM_FS_ROOT`, `SWARM_FS_MAX_BYTES`
pub const ENV_PREFIX: &str = "SWARM_FS";

/// Default read limit (1 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FileSystemConfig {
    pub root: PathBuf,
    pub max_bytes: u64,
}

impl FileSystemConfig {
    pub fn layered() -> LayeredConfig {
        let mut defaults = Map::new();
        defaults.insert("root".into(), json!("."));
        defaults.insert("max_bytes".into(), json!(DEFAULT_MAX_BYTES));
        LayeredConfig::new(CONFIG_LOCATION, &["root", "max_bytes"])
            .text_keys(&["root"])
            .with_defaults(&defaults)
    }

    pub fn resolve(overrides: &Map<String, Value>) -> Result<Self> {
        Ok(Self::layered()
            .with_env(ENV_PREFIX)
            .with_overrides(overrides)
            .extract()?)
    }
}

/// One directory entry
#[derive(Clone, Debug, Serialize)]
struct Entry {
    name: String,
    kind: &'static str,
    size: u64,
}

/// Tool for reading files under a root directory
#[derive(Debug)]
pub struct FileSystemTool {
    root: PathBuf,
    max_bytes: u64,
}

impl FileSystemTool {
    /// The root must exist; it is canonicalized once here
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ToolsError::PathNotFound(root.to_path_buf()),
            _ => ToolsError::Io(err),
        })?;
        Ok(Self {
            root,
            max_bytes: DEFAULT_MAX_BYTES,
        })
    }

    pub fn from_config(config: &FileSystemConfig) -> Result<Self> {
        Ok(Self::new(&config.root)?.with_max_bytes(config.max_bytes))
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a requested path to a canonical path inside the root
    async fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let requested_path = Path::new(requested);

        let relative = if requested_path.is_absolute() {
            requested_path
                .strip_prefix(&self.root)
                .map_err(|_| ToolsError::PathEscape(requested_path.to_path_buf()))?
        } else {
            requested_path
        };

        // reject `..` walks before touching the disk
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::ParentDir => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| ToolsError::PathEscape(requested_path.to_path_buf()))?;
                }
                Component::Normal(_) => depth += 1,
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        let joined = self.root.join(relative);
        let canonical = tokio::fs::canonicalize(&joined)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    ToolsError::PathNotFound(requested_path.to_path_buf())
                }
                _ => ToolsError::Io(err),
            })?;

        // symlinks may still point outside
        if !canonical.starts_with(&self.root) {
            return Err(ToolsError::PathEscape(requested_path.to_path_buf()));
        }
        Ok(canonical)
    }

    async fn read_file(&self, requested: &str) -> Result<Vec<u8>> {
        let path = self.resolve(requested).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            return Err(ToolsError::InvalidParameter {
                name: "path".into(),
                reason: format!("'{requested}' is a directory; use list_directory"),
            });
        }
        if metadata.len() > self.max_bytes {
            return Err(ToolsError::FileTooLarge {
                path: PathBuf::from(requested),
                size: metadata.len(),
                limit: self.max_bytes,
            });
        }
        let bytes = tokio::fs::read(&path).await?;
        tracing::debug!(tool = TOOL_NAME, path = %path.display(), bytes = bytes.len(), "Read file");
        Ok(bytes)
    }

    async fn list_directory(&self, requested: &str) -> Result<Value> {
        let path = self.resolve(requested).await?;
        let mut reader = tokio::fs::read_dir(&path).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if metadata.is_dir() { "directory" } else { "file" },
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(json!({
            "path": requested,
            "entries": entries,
        }))
    }
}

#[async_trait]
impl Tool for FileSystemTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.into(),
            description: "Read files and list directories under the configured workspace root.".into(),
            methods: vec![
                MethodSchema {
                    name: "read_file".into(),
                    description: "Return the contents of a file".into(),
                    parameters: vec![ParameterSchema::required(
                        "path",
                        "string",
                        "Path relative to the workspace root",
                    )],
                },
                MethodSchema {
                    name: "list_directory".into(),
                    description: "List a directory's entries with kind and size".into(),
                    parameters: vec![ParameterSchema::optional(
                        "path",
                        "string",
                        "Directory relative to the workspace root",
                        Some(json!(".")),
                    )],
                },
            ],
            accepts_intents: false,
            category: Some("filesystem".into()),
        }
    }

    async fn call(&self, method: &str, params: &Map<String, Value>) -> CoreResult<ToolOutput> {
        let path = params.get("path").and_then(Value::as_str);
        match method {
            "read_file" => {
                let path = path.ok_or_else(|| ToolsError::InvalidParameter {
                    name: "path".into(),
                    reason: "expected a string".into(),
                })?;
                Ok(ToolOutput::Bytes(self.read_file(path).await?))
            }
            "list_directory" => Ok(ToolOutput::Json(
                self.list_directory(path.unwrap_or(".")).await?,
            )),
            other => Err(ToolsError::InvalidParameter {
                name: "method".into(),
                reason: format!("unknown method '{other}'"),
            }
            .into()),
        }
    }
}
