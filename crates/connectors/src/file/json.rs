//! JSON record source: array files and newline-delimited files.

use crate::file::error::FileError;
use model::records::record::Record;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonLayout {
    Array,
    Lines,
}

/// Lists input files in `dir`, sorted by file name, without `excluded`.
pub async fn discover_files(dir: &Path, excluded: &str) -> Result<Vec<PathBuf>, FileError> {
    if !tokio::fs::try_exists(dir).await? {
        return Err(FileError::NotFound(dir.display().to_string()));
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let has_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if has_ext && name != excluded {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), files = files.len(), "Discovered input files");
    Ok(files)
}

/// Reads every record of one file, in file order.
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub async fn read_all(&self) -> Result<Vec<Record>, FileError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let layout = self.layout(&content);
        let records = match layout {
            JsonLayout::Array => self.parse_array(&content)?,
            JsonLayout::Lines => self.parse_lines(&content)?,
        };

        info!(file = %self.file_name(), records = records.len(), ?layout, "Loaded records");
        Ok(records)
    }

    fn layout(&self, content: &str) -> JsonLayout {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jsonl") | Some("ndjson") => JsonLayout::Lines,
            _ if content.trim_start().starts_with('[') => JsonLayout::Array,
            _ => JsonLayout::Lines,
        }
    }

    fn parse_array(&self, content: &str) -> Result<Vec<Record>, FileError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|source| FileError::Json {
                file: self.file_name(),
                source,
            })?;

        let serde_json::Value::Array(items) = value else {
            return Err(self.invalid("expected a JSON array of objects".to_string()));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| self.to_record(item, idx))
            .collect()
    }

    fn parse_lines(&self, content: &str) -> Result<Vec<Record>, FileError> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                let item: serde_json::Value =
                    serde_json::from_str(line).map_err(|source| FileError::Json {
                        file: format!("{}:{}", self.file_name(), idx + 1),
                        source,
                    })?;
                self.to_record(item, idx)
            })
            .collect()
    }

    fn to_record(&self, item: serde_json::Value, idx: usize) -> Result<Record, FileError> {
        match item {
            serde_json::Value::Object(map) => Ok(Record::from_json_object(map)),
            other => Err(self.invalid(format!(
                "element {idx} is not an object (found {})",
                json_kind(&other)
            ))),
        }
    }

    fn invalid(&self, reason: String) -> FileError {
        FileError::InvalidFormat {
            file: self.file_name(),
            reason,
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
