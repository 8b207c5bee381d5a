//! Local JSON file backend.
//!
//! Writes go to a sibling temp file which is then renamed over the
//! original, so a reader sees either the old table or the new one.

use async_trait::async_trait;
use classbell_core::{
    error::ClassbellError,
    traits::{RecordTable, Table},
};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct FileTable {
    path: PathBuf,
}

impl FileTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "roster.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn unavailable(what: &str, path: &Path, e: impl std::fmt::Display) -> ClassbellError {
    ClassbellError::StoreUnavailable(format!("failed to {what} {}: {e}", path.display()))
}

#[async_trait]
impl RecordTable for FileTable {
    fn name(&self) -> &str {
        "file"
    }

    async fn read(&self) -> Result<Table, ClassbellError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("roster file {} not found, starting empty", self.path.display());
                return Ok(Table::default());
            }
            Err(e) => return Err(unavailable("read", &self.path, e)),
        };
        serde_json::from_str(&content).map_err(|e| unavailable("parse", &self.path, e))
    }

    async fn write(&self, table: &Table) -> Result<(), ClassbellError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| unavailable("create dir for", &self.path, e))?;
            }
        }
        let body = serde_json::to_string_pretty(table)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| unavailable("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| unavailable("replace", &self.path, e))
    }
}
