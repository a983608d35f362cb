use crate::execution::config::RunConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// `pending -> running -> {completed, failed}`; a run may also fail before it starts.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Point-in-time progress of a run (the progress snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    pub current_file: String,
    pub current_batch: u64,
    pub files_completed: usize,
    pub total_files: usize,
    pub batches_planned: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub total_records_processed: u64,
    pub batch_size: usize,
    pub concurrency: usize,
    pub cloud_provider: String,
    pub instance_type: String,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl RunState {
    pub fn new(run_id: &str, config: &RunConfig, total_files: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            current_file: String::new(),
            current_batch: 0,
            files_completed: 0,
            total_files,
            batches_planned: 0,
            batches_succeeded: 0,
            batches_failed: 0,
            total_records_processed: 0,
            batch_size: config.batch_size.get(),
            concurrency: config.concurrency.get(),
            cloud_provider: config.cloud_provider.clone(),
            instance_type: config.instance_type.clone(),
            start_time: now,
            last_update: now,
            error_message: None,
        }
    }

    pub fn batches_completed(&self) -> u64 {
        self.batches_succeeded + self.batches_failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Error,
    Skipped,
}

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub table: Option<String>,
    pub status: FileStatus,
    pub records_processed: u64,
    pub records_inserted: u64,
    pub batches: u64,
    pub failed_batches: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl FileResult {
    pub fn skipped(filename: &str, reason: &str) -> Self {
        Self {
            filename: filename.to_string(),
            table: None,
            status: FileStatus::Skipped,
            records_processed: 0,
            records_inserted: 0,
            batches: 0,
            failed_batches: 0,
            reason: Some(reason.to_string()),
        }
    }

    pub fn error(filename: &str, table: &str, reason: String) -> Self {
        Self {
            filename: filename.to_string(),
            table: Some(table.to_string()),
            status: FileStatus::Error,
            records_processed: 0,
            records_inserted: 0,
            batches: 0,
            failed_batches: 0,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub batches: u64,
    pub records: u64,
    pub duration: f64,
    pub avg_rps: f64,
}

/// Terminal summary of a run (`migration_results.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub cloud_provider: String,
    pub instance_type: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub total_batches: u64,
    pub successful_batches: u64,
    pub failed_batches: u64,
    pub skipped_batches: u64,
    pub total_records: u64,
    pub dropped_records: u64,
    pub total_duration_seconds: f64,
    pub average_batch_time_seconds: f64,
    pub average_records_per_second: f64,
    pub start_time: DateTime<Utc>,
    pub completion_time: DateTime<Utc>,
    pub file_results: Vec<FileResult>,
    pub table_statistics: BTreeMap<String, TableStats>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub initial_counts: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub table_counts: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl RunSummary {
    /// Summary for a run that stopped before any file was loaded.
    pub fn aborted(record: &RunRecord, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: record.run_id.clone(),
            status: RunStatus::Failed,
            cloud_provider: record.cloud_provider.clone(),
            instance_type: record.instance_type.clone(),
            batch_size: record.batch_size,
            concurrency: record.concurrency,
            total_files: 0,
            successful_files: 0,
            failed_files: 0,
            skipped_files: 0,
            total_batches: 0,
            successful_batches: 0,
            failed_batches: 0,
            skipped_batches: 0,
            total_records: 0,
            dropped_records: 0,
            total_duration_seconds: (now - record.created_at).num_milliseconds().max(0) as f64
                / 1000.0,
            average_batch_time_seconds: 0.0,
            average_records_per_second: 0.0,
            start_time: record.created_at,
            completion_time: now,
            file_results: Vec::new(),
            table_statistics: BTreeMap::new(),
            initial_counts: None,
            table_counts: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_full_success(&self) -> bool {
        self.status == RunStatus::Completed && self.failed_batches == 0
    }
}

/// Registry entry for one run. The index stores one line per state change;
/// the latest line for a `run_id` is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cloud_provider: String,
    pub instance_type: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub tables: Vec<String>,
    pub status: RunStatus,
    /// Relative to the registry root.
    pub output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub average_records_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub successful_batches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failed_batches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl RunRecord {
    pub fn pending(run_id: &str, output_dir: &str, config: &RunConfig) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            created_at: now,
            updated_at: now,
            cloud_provider: config.cloud_provider.clone(),
            instance_type: config.instance_type.clone(),
            batch_size: config.batch_size.get(),
            concurrency: config.concurrency.get(),
            tables: config.tables.clone(),
            status: RunStatus::Pending,
            output_dir: output_dir.to_string(),
            total_records: None,
            total_duration_seconds: None,
            average_records_per_second: None,
            successful_batches: None,
            failed_batches: None,
            error_message: None,
        }
    }

    pub fn apply_summary(&mut self, summary: &RunSummary) {
        self.status = summary.status;
        self.total_records = Some(summary.total_records);
        self.total_duration_seconds = Some(summary.total_duration_seconds);
        self.average_records_per_second = Some(summary.average_records_per_second);
        self.successful_batches = Some(summary.successful_batches);
        self.failed_batches = Some(summary.failed_batches);
        self.error_message = summary.error_message.clone();
        self.updated_at = Utc::now();
    }
}

/// Query over the run index. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub provider: Option<String>,
    pub status: Option<RunStatus>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn matches(&self, record: &RunRecord) -> bool {
        self.provider
            .as_ref()
            .is_none_or(|p| p.eq_ignore_ascii_case(&record.cloud_provider))
            && self.status.is_none_or(|s| s == record.status)
            && self.batch_size.is_none_or(|b| b == record.batch_size)
            && self.concurrency.is_none_or(|c| c == record.concurrency)
    }
}
