//! Per-run artifact files.
//!
//! Every document is written to a temporary sibling and renamed into place,
//! so a reader sees either the previous or the next complete version.

use crate::error::StatsError;
use model::execution::{
    metric::BatchMetric,
    run::{RunState, RunSummary},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROGRESS_FILE: &str = "migration_progress.json";
pub const STATS_FILE: &str = "migration_stats.json";
pub const RESULTS_FILE: &str = "migration_results.json";

/// The batch log (`migration_stats.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsLog {
    pub run_id: String,
    pub cloud_provider: String,
    pub instance_type: String,
    pub batches: Vec<BatchMetric>,
}

#[derive(Debug, Clone)]
pub struct RunArtifacts {
    dir: PathBuf,
}

impl RunArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_progress(&self, state: &RunState) -> Result<(), StatsError> {
        self.write_json(PROGRESS_FILE, state).await
    }

    pub async fn write_stats(&self, log: &StatsLog) -> Result<(), StatsError> {
        self.write_json(STATS_FILE, log).await
    }

    pub async fn write_results(&self, summary: &RunSummary) -> Result<(), StatsError> {
        self.write_json(RESULTS_FILE, summary).await
    }

    pub async fn read_progress(&self) -> Result<Option<RunState>, StatsError> {
        self.read_json(PROGRESS_FILE).await
    }

    pub async fn read_stats(&self) -> Result<Option<StatsLog>, StatsError> {
        self.read_json(STATS_FILE).await
    }

    pub async fn read_results(&self) -> Result<Option<RunSummary>, StatsError> {
        self.read_json(RESULTS_FILE).await
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StatsError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        debug!(file = %target.display(), bytes = bytes.len(), "Wrote run artifact");
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StatsError> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
