use crate::{error::RegistryError, state::RunIndex};
use async_trait::async_trait;
use model::execution::run::RunRecord;
use std::{
    collections::HashMap,
    io::SeekFrom,
    path::{Path, PathBuf},
};
use tokio::{
    fs::OpenOptions,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};
use tracing::warn;

/// One JSON document per line. Appends are serialized so concurrent writers
/// never interleave partial lines.
pub struct JsonlRunIndex {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunIndex {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RunIndex for JsonlRunIndex {
    async fn append(&self, record: &RunRecord) -> Result<(), RegistryError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // A torn previous append must not swallow this line.
        let len = file.metadata().await?.len();
        if len > 0 {
            file.seek(SeekFrom::Start(len - 1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                warn!(index = %self.path.display(), "Run index ends mid-line, terminating it");
                line.insert(0, b'\n');
            }
        }
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<RunRecord>, RegistryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records: Vec<RunRecord> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: RunRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        index = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable run index line"
                    );
                    continue;
                }
            };

            match position.get(&record.run_id) {
                Some(&idx) => records[idx] = record,
                None => {
                    position.insert(record.run_id.clone(), records.len());
                    records.push(record);
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::execution::{config::RunConfig, run::RunStatus};
    use std::{num::NonZeroUsize, sync::Arc};
    use tempfile::tempdir;

    fn record(id: &str) -> RunRecord {
        let config = RunConfig::new(NonZeroUsize::new(100).unwrap(), NonZeroUsize::MIN);
        RunRecord::pending(id, &format!("runs/{id}"), &config)
    }

    #[tokio::test]
    async fn test_latest_line_wins() {
        let dir = tempdir().unwrap();
        let index = JsonlRunIndex::open(dir.path().join("index.jsonl"));
        assert!(index.load().await.unwrap().is_empty());

        index.append(&record("a")).await.unwrap();
        index.append(&record("b")).await.unwrap();
        let mut done = record("a");
        done.status = RunStatus::Completed;
        done.total_records = Some(42);
        index.append(&done).await.unwrap();

        let loaded = index.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].run_id, "a");
        assert_eq!(loaded[0].status, RunStatus::Completed);
        assert_eq!(loaded[0].total_records, Some(42));
        assert_eq!(loaded[1].status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn test_skips_corrupt_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let index = JsonlRunIndex::open(&path);
        index.append(&record("a")).await.unwrap();

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"run_id\": \"truncated\n\n");
        std::fs::write(&path, content).unwrap();
        index.append(&record("b")).await.unwrap();

        let ids: Vec<_> = index
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_torn_line_does_not_swallow_next_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let index = JsonlRunIndex::open(&path);
        index.append(&record("a")).await.unwrap();

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"run_id\": \"torn\", \"sta");
        std::fs::write(&path, content).unwrap();
        index.append(&record("b")).await.unwrap();
        index.append(&record("c")).await.unwrap();

        let ids: Vec<_> = index
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_line_aligned() {
        let dir = tempdir().unwrap();
        let index = Arc::new(JsonlRunIndex::open(dir.path().join("index.jsonl")));

        let mut handles = Vec::new();
        for n in 0..32 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                index.append(&record(&format!("run-{n}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(index.load().await.unwrap().len(), 32);
    }
}
