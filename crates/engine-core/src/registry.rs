//! Run registry: allocates run ids and output directories, and keeps the
//! run index current.

use crate::{
    artifacts::RunArtifacts,
    error::RegistryError,
    state::{RunIndex, jsonl_store::JsonlRunIndex},
};
use chrono::{DateTime, Utc};
use model::execution::{
    config::RunConfig,
    run::{RunFilter, RunRecord, RunStatus, RunSummary},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const INDEX_FILE: &str = "test_runs_index.jsonl";
pub const RUNS_DIR: &str = "runs";

/// Bound on `_2`, `_3`, ... suffixes tried when an id's directory already exists.
const MAX_ID_SUFFIX: usize = 1000;

pub struct RunRegistry {
    root: PathBuf,
    index: Arc<dyn RunIndex>,
    // Serializes read-modify-append of a single record.
    update_lock: Mutex<()>,
}

impl RunRegistry {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(RUNS_DIR)).await?;
        let index = Arc::new(JsonlRunIndex::open(root.join(INDEX_FILE)));
        Ok(Self::with_index(root, index))
    }

    pub fn with_index(root: PathBuf, index: Arc<dyn RunIndex>) -> Self {
        Self {
            root,
            index,
            update_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a fresh id and output directory and indexes the run as `pending`.
    pub async fn begin_run(
        &self,
        config: &RunConfig,
    ) -> Result<(RunRecord, RunArtifacts), RegistryError> {
        let base = run_id(Utc::now(), config);
        let runs_dir = self.root.join(RUNS_DIR);
        tokio::fs::create_dir_all(&runs_dir).await?;

        let mut run_id = base.clone();
        let mut suffix = 1;
        loop {
            match tokio::fs::create_dir(runs_dir.join(&run_id)).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    if suffix > MAX_ID_SUFFIX {
                        return Err(RegistryError::Allocation(base));
                    }
                    run_id = format!("{base}_{suffix}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let output_dir = format!("{RUNS_DIR}/{run_id}");
        let record = RunRecord::pending(&run_id, &output_dir, config);
        self.index.append(&record).await?;

        info!(run_id = %run_id, dir = %output_dir, "Run registered");
        let artifacts = self.artifacts(&record);
        Ok((record, artifacts))
    }

    pub async fn mark_running(&self, run_id: &str) -> Result<RunRecord, RegistryError> {
        self.transition(run_id, RunStatus::Running, |_| {}).await
    }

    /// Records the terminal summary. The status comes from the summary.
    pub async fn complete_run(
        &self,
        run_id: &str,
        summary: &RunSummary,
    ) -> Result<RunRecord, RegistryError> {
        self.transition(run_id, summary.status, |record| record.apply_summary(summary))
            .await
    }

    pub async fn fail_run(&self, run_id: &str, message: &str) -> Result<RunRecord, RegistryError> {
        warn!(run_id = %run_id, error = %message, "Run failed");
        self.transition(run_id, RunStatus::Failed, |record| {
            record.error_message = Some(message.to_string());
        })
        .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord, RegistryError> {
        self.index
            .load()
            .await?
            .into_iter()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| RegistryError::NotFound(run_id.to_string()))
    }

    /// Most recent first.
    pub async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, RegistryError> {
        let mut runs: Vec<RunRecord> = self
            .index
            .load()
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.run_id.cmp(&a.run_id))
        });
        if let Some(limit) = filter.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    pub fn artifacts(&self, record: &RunRecord) -> RunArtifacts {
        RunArtifacts::new(self.root.join(&record.output_dir))
    }

    async fn transition(
        &self,
        run_id: &str,
        next: RunStatus,
        update: impl FnOnce(&mut RunRecord),
    ) -> Result<RunRecord, RegistryError> {
        let _guard = self.update_lock.lock().await;
        let mut record = self.get_run(run_id).await?;
        if !record.status.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                run_id: run_id.to_string(),
                from: record.status,
                to: next,
            });
        }

        update(&mut record);
        record.status = next;
        record.updated_at = Utc::now();
        self.index.append(&record).await?;
        Ok(record)
    }
}

/// `{timestamp}_{provider}_{instance}_b{batch}_c{concurrency}`.
pub fn run_id(at: DateTime<Utc>, config: &RunConfig) -> String {
    format!(
        "{}_{}_{}_b{}_c{}",
        at.format("%Y%m%d_%H%M%S"),
        sanitize(&config.cloud_provider),
        sanitize(&config.instance_type),
        config.batch_size,
        config.concurrency
    )
}

fn sanitize(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{RunOutcome, StatsAggregator};
    use chrono::TimeZone;
    use std::num::NonZeroUsize;
    use tempfile::tempdir;

    fn config(provider: &str, batch: usize) -> RunConfig {
        RunConfig::new(NonZeroUsize::new(batch).unwrap(), NonZeroUsize::new(5).unwrap())
            .with_labels(provider, "n2.standard 4")
            .with_tables(vec!["t".into()])
    }

    #[test]
    fn test_run_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            run_id(at, &config("GCP", 500)),
            "20240309_140507_GCP_n2_standard_4_b500_c5"
        );
    }

    #[tokio::test]
    async fn test_same_config_gets_distinct_runs() {
        let dir = tempdir().unwrap();
        let registry = RunRegistry::open(dir.path()).await.unwrap();

        let (first, first_artifacts) = registry.begin_run(&config("GCP", 100)).await.unwrap();
        let (second, second_artifacts) = registry.begin_run(&config("GCP", 100)).await.unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_ne!(first_artifacts.dir(), second_artifacts.dir());
        assert!(first_artifacts.dir().is_dir());
        assert!(second_artifacts.dir().is_dir());

        let all = registry.list_runs(&RunFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(registry.get_run(&first.run_id).await.unwrap().status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn test_lifecycle_updates_only_its_own_entry() {
        let dir = tempdir().unwrap();
        let registry = RunRegistry::open(dir.path()).await.unwrap();

        let (done, artifacts) = registry.begin_run(&config("AWS", 100)).await.unwrap();
        let (other, _) = registry.begin_run(&config("GCP", 500)).await.unwrap();

        registry.mark_running(&done.run_id).await.unwrap();
        let stats = StatsAggregator::start(&done.run_id, &config("AWS", 100), 0, artifacts)
            .await
            .unwrap();
        let summary = stats.finalize(RunOutcome::default()).await.unwrap();
        let completed = registry.complete_run(&done.run_id, &summary).await.unwrap();

        assert_eq!(completed.status, RunStatus::Completed);
        assert_eq!(completed.total_records, Some(0));
        assert_eq!(
            registry.get_run(&other.run_id).await.unwrap().status,
            RunStatus::Pending
        );

        let err = registry.mark_running(&done.run_id).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert!(matches!(
            registry.get_run("missing").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_before_start() {
        let dir = tempdir().unwrap();
        let registry = RunRegistry::open(dir.path()).await.unwrap();
        let (record, _) = registry.begin_run(&config("AWS", 100)).await.unwrap();

        let failed = registry.fail_run(&record.run_id, "table t not found").await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("table t not found"));
    }

    #[tokio::test]
    async fn test_list_runs_filters_and_limits() {
        let dir = tempdir().unwrap();
        let registry = RunRegistry::open(dir.path()).await.unwrap();
        for batch in [100, 500, 100] {
            registry.begin_run(&config("GCP", batch)).await.unwrap();
        }
        registry.begin_run(&config("AWS", 100)).await.unwrap();

        let gcp = RunFilter {
            provider: Some("gcp".into()),
            batch_size: Some(100),
            ..Default::default()
        };
        assert_eq!(registry.list_runs(&gcp).await.unwrap().len(), 2);

        let limited = RunFilter {
            limit: Some(1),
            ..Default::default()
        };
        let latest = registry.list_runs(&limited).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].cloud_provider, "AWS");
    }
}
