//! Run statistics: progress counters and the batch log, shared by all workers.

use crate::{
    artifacts::{RunArtifacts, StatsLog},
    error::StatsError,
};
use chrono::Utc;
use model::execution::{
    config::RunConfig,
    metric::BatchMetric,
    run::{FileResult, FileStatus, RunState, RunStatus, RunSummary, TableStats},
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How a run ended, as seen by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// `Some` marks the run `failed` with this message.
    pub error_message: Option<String>,
    pub initial_counts: Option<BTreeMap<String, i64>>,
    pub table_counts: Option<BTreeMap<String, i64>>,
}

impl RunOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

struct Inner {
    state: RunState,
    metrics: Vec<BatchMetric>,
    file_results: Vec<FileResult>,
    since_flush: usize,
    finalized: bool,
}

/// Serializes every mutation behind one mutex; artifact writes happen under
/// the same lock so snapshots on disk follow the in-memory order.
#[derive(Clone)]
pub struct StatsAggregator {
    inner: Arc<Mutex<Inner>>,
    artifacts: RunArtifacts,
    snapshot_interval: usize,
}

impl StatsAggregator {
    /// Writes the initial progress snapshot and an empty batch log.
    pub async fn start(
        run_id: &str,
        config: &RunConfig,
        total_files: usize,
        artifacts: RunArtifacts,
    ) -> Result<Self, StatsError> {
        let state = RunState::new(run_id, config, total_files);
        artifacts.write_progress(&state).await?;
        artifacts
            .write_stats(&StatsLog {
                run_id: run_id.to_string(),
                cloud_provider: state.cloud_provider.clone(),
                instance_type: state.instance_type.clone(),
                batches: Vec::new(),
            })
            .await?;

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                metrics: Vec::new(),
                file_results: Vec::new(),
                since_flush: 0,
                finalized: false,
            })),
            artifacts,
            snapshot_interval: config.snapshot_interval.get(),
        })
    }

    pub fn artifacts(&self) -> &RunArtifacts {
        &self.artifacts
    }

    /// Marks `file_name` as the file being loaded and adds its planned batches.
    pub async fn begin_file(&self, file_name: &str, planned_batches: u64) -> Result<(), StatsError> {
        let mut inner = self.inner.lock().await;
        inner.state.current_file = file_name.to_string();
        inner.state.current_batch = 0;
        inner.state.batches_planned += planned_batches;
        inner.state.last_update = Utc::now();
        self.artifacts.write_progress(&inner.state).await
    }

    pub async fn record_batch(&self, metric: BatchMetric) -> Result<(), StatsError> {
        let mut inner = self.inner.lock().await;

        if metric.success {
            inner.state.batches_succeeded += 1;
        } else {
            inner.state.batches_failed += 1;
        }
        inner.state.total_records_processed += metric.committed_records();
        inner.state.current_batch = inner.state.current_batch.max(metric.batch_number);
        inner.state.last_update = Utc::now();
        inner.metrics.push(metric);
        inner.since_flush += 1;

        self.artifacts.write_progress(&inner.state).await?;
        if inner.since_flush >= self.snapshot_interval {
            self.flush_stats(&mut inner).await?;
        }
        Ok(())
    }

    pub async fn complete_file(&self, result: FileResult) -> Result<(), StatsError> {
        let mut inner = self.inner.lock().await;
        if result.status != FileStatus::Skipped {
            inner.state.files_completed += 1;
        }
        inner.state.current_file.clear();
        inner.state.last_update = Utc::now();
        inner.file_results.push(result);
        self.artifacts.write_progress(&inner.state).await
    }

    /// Point-in-time copy of the progress counters, also written to disk.
    pub async fn snapshot_progress(&self) -> Result<RunState, StatsError> {
        let mut inner = self.inner.lock().await;
        inner.state.last_update = Utc::now();
        self.artifacts.write_progress(&inner.state).await?;
        Ok(inner.state.clone())
    }

    /// The batch log in planning order, with cumulative counts.
    pub async fn batch_log(&self) -> Vec<BatchMetric> {
        let inner = self.inner.lock().await;
        ordered_with_cumulative(&inner.metrics)
    }

    pub async fn finalize(&self, outcome: RunOutcome) -> Result<RunSummary, StatsError> {
        let mut inner = self.inner.lock().await;
        if inner.finalized {
            return Err(StatsError::AlreadyFinalized);
        }

        let status = if outcome.error_message.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let now = Utc::now();
        inner.state.status = status;
        inner.state.current_file.clear();
        inner.state.error_message = outcome.error_message.clone();
        inner.state.last_update = now;

        self.flush_stats(&mut inner).await?;

        let summary = summarize(&inner, status, outcome, now);
        self.artifacts.write_progress(&inner.state).await?;
        self.artifacts.write_results(&summary).await?;
        inner.finalized = true;

        info!(
            run_id = %summary.run_id,
            status = %summary.status,
            batches = summary.total_batches,
            failed = summary.failed_batches,
            records = summary.total_records,
            rec_per_sec = %format!("{:.1}", summary.average_records_per_second),
            "Run finalized"
        );
        Ok(summary)
    }

    async fn flush_stats(&self, inner: &mut Inner) -> Result<(), StatsError> {
        let log = StatsLog {
            run_id: inner.state.run_id.clone(),
            cloud_provider: inner.state.cloud_provider.clone(),
            instance_type: inner.state.instance_type.clone(),
            batches: ordered_with_cumulative(&inner.metrics),
        };
        self.artifacts.write_stats(&log).await?;
        inner.since_flush = 0;
        debug!(batches = log.batches.len(), "Flushed batch log");
        Ok(())
    }
}

/// Sorts by planning order and folds committed records into
/// `cumulative_records`, so the result does not depend on completion order.
pub fn ordered_with_cumulative(metrics: &[BatchMetric]) -> Vec<BatchMetric> {
    let mut ordered = metrics.to_vec();
    ordered.sort_by_key(BatchMetric::key);

    let mut running = 0u64;
    for metric in &mut ordered {
        running += metric.committed_records();
        metric.cumulative_records = running;
    }
    ordered
}

fn summarize(
    inner: &Inner,
    status: RunStatus,
    outcome: RunOutcome,
    now: chrono::DateTime<Utc>,
) -> RunSummary {
    let state = &inner.state;
    let metrics = &inner.metrics;

    let total_records: u64 = metrics.iter().map(BatchMetric::committed_records).sum();
    let recorded = metrics.len() as u64;
    let wall = (now - state.start_time)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let batch_time: f64 = metrics.iter().map(|m| m.total_duration_seconds).sum();

    let mut table_statistics: BTreeMap<String, TableStats> = BTreeMap::new();
    for metric in metrics.iter().filter(|m| m.success) {
        let entry = table_statistics.entry(metric.table_name.clone()).or_default();
        entry.batches += 1;
        entry.records += metric.records_count as u64;
        entry.duration += metric.total_duration_seconds;
    }
    for stats in table_statistics.values_mut() {
        if stats.duration > 0.0 {
            stats.avg_rps = stats.records as f64 / stats.duration;
        }
    }

    let count_files = |status: FileStatus| {
        inner
            .file_results
            .iter()
            .filter(|r| r.status == status)
            .count()
    };

    RunSummary {
        run_id: state.run_id.clone(),
        status,
        cloud_provider: state.cloud_provider.clone(),
        instance_type: state.instance_type.clone(),
        batch_size: state.batch_size,
        concurrency: state.concurrency,
        total_files: state.total_files,
        successful_files: count_files(FileStatus::Success),
        failed_files: count_files(FileStatus::Error),
        skipped_files: count_files(FileStatus::Skipped),
        total_batches: recorded,
        successful_batches: state.batches_succeeded,
        failed_batches: state.batches_failed,
        skipped_batches: state.batches_planned.saturating_sub(recorded),
        total_records,
        dropped_records: metrics.iter().map(|m| m.dropped_records.len() as u64).sum(),
        total_duration_seconds: wall,
        average_batch_time_seconds: if recorded > 0 {
            batch_time / recorded as f64
        } else {
            0.0
        },
        average_records_per_second: if wall > 0.0 {
            total_records as f64 / wall
        } else {
            0.0
        },
        start_time: state.start_time,
        completion_time: now,
        file_results: inner.file_results.clone(),
        table_statistics,
        initial_counts: outcome.initial_counts,
        table_counts: outcome.table_counts,
        error_message: outcome.error_message,
    }
}
