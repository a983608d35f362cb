use crate::error::LoadError;
use connectors::{
    file::json::{JsonRecordSource, discover_files},
    pool::ConnectionPool,
    schema::{SchemaCache, SchemaResolver},
    sql::base::connection::ConnectionFactory,
};
use engine_config::mapping::TableMapping;
use engine_core::{
    artifacts::RunArtifacts,
    metrics::{RunOutcome, StatsAggregator},
    registry::RunRegistry,
};
use engine_processing::{dispatcher::Dispatcher, executor::BatchExecutor};
use model::execution::{
    config::RunConfig,
    run::{FileResult, FileStatus, RunRecord, RunSummary},
};
use planner::batch::BatchPlanner;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const INTERRUPTED: &str = "interrupted";

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub record: RunRecord,
    pub summary: RunSummary,
    pub interrupted: bool,
}

/// Drives one run: register, resolve, plan, dispatch, finalize.
pub struct LoadRunner {
    registry: Arc<RunRegistry>,
    factory: Arc<dyn ConnectionFactory>,
    cancel: CancellationToken,
}

struct InputFile {
    path: PathBuf,
    name: String,
    table: Option<String>,
}

impl LoadRunner {
    pub fn new(
        registry: Arc<RunRegistry>,
        factory: Arc<dyn ConnectionFactory>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            factory,
            cancel,
        }
    }

    /// Fatal errors mark the run `failed` in the registry before they are returned.
    pub async fn run(
        &self,
        input_dir: &Path,
        mapping: &TableMapping,
        config: RunConfig,
    ) -> Result<LoadReport, LoadError> {
        let config = Arc::new(config);
        let (record, artifacts) = self.registry.begin_run(&config).await?;
        let run_id = record.run_id.clone();
        info!(
            run_id = %run_id,
            batch_size = config.batch_size.get(),
            concurrency = config.concurrency.get(),
            provider = %config.cloud_provider,
            instance = %config.instance_type,
            "Starting load"
        );

        match self
            .execute(&run_id, input_dir, mapping, config, artifacts.clone())
            .await
        {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Load aborted");
                let message = e.to_string();
                write_aborted_results(&record, &artifacts, &message).await;
                if let Err(reg) = self.registry.fail_run(&run_id, &message).await {
                    warn!(run_id = %run_id, error = %reg, "Could not mark run as failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: &str,
        input_dir: &Path,
        mapping: &TableMapping,
        config: Arc<RunConfig>,
        artifacts: RunArtifacts,
    ) -> Result<LoadReport, LoadError> {
        let files: Vec<InputFile> = discover_files(input_dir, &mapping.sample_file)
            .await?
            .into_iter()
            .map(|path| {
                let name = file_name(&path);
                let table = mapping.table_for(&name).map(str::to_string);
                InputFile { path, name, table }
            })
            .collect();
        if files.is_empty() {
            return Err(LoadError::NoInputFiles(input_dir.display().to_string()));
        }

        let mut tables: Vec<String> = Vec::new();
        for table in files.iter().filter_map(|f| f.table.as_ref()) {
            if !tables.contains(table) {
                tables.push(table.clone());
            }
        }

        let pool = ConnectionPool::open(
            self.factory.clone(),
            config.concurrency.get(),
            config.acquire_timeout(),
        )
        .await?;

        let result = self
            .load_files(run_id, &files, &tables, &pool, config, artifacts)
            .await;
        pool.close_all();
        result
    }

    async fn load_files(
        &self,
        run_id: &str,
        files: &[InputFile],
        tables: &[String],
        pool: &ConnectionPool,
        config: Arc<RunConfig>,
        artifacts: RunArtifacts,
    ) -> Result<LoadReport, LoadError> {
        let schemas = SchemaResolver::new(config.system_columns.clone())
            .resolve_all(pool, tables)
            .await?;

        self.registry.mark_running(run_id).await?;
        let stats = StatsAggregator::start(run_id, &config, files.len(), artifacts).await?;

        let initial_counts = if config.collect_table_counts {
            Some(table_counts(pool, tables).await)
        } else {
            None
        };

        let planner = BatchPlanner::new(config.batch_size);
        let dispatcher = Dispatcher::new(
            BatchExecutor::new(pool.clone(), config.clone()),
            stats.clone(),
            config.concurrency.get(),
            self.cancel.clone(),
        );

        for (file_index, file) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                stats
                    .complete_file(FileResult::skipped(&file.name, INTERRUPTED))
                    .await?;
                continue;
            }

            let result = self
                .load_file(file_index, file, &schemas, &planner, &dispatcher, &stats)
                .await?;
            stats.complete_file(result).await?;
        }

        let table_counts = if config.collect_table_counts {
            Some(table_counts(pool, tables).await)
        } else {
            None
        };

        let interrupted = self.cancel.is_cancelled();
        let outcome = RunOutcome {
            error_message: interrupted.then(|| INTERRUPTED.to_string()),
            initial_counts,
            table_counts,
        };
        let summary = stats.finalize(outcome).await?;
        let record = self.registry.complete_run(run_id, &summary).await?;

        info!(
            run_id = %run_id,
            status = %summary.status,
            records = summary.total_records,
            failed_batches = summary.failed_batches,
            duration_s = summary.total_duration_seconds,
            "Load finished"
        );

        Ok(LoadReport {
            record,
            summary,
            interrupted,
        })
    }

    async fn load_file(
        &self,
        file_index: usize,
        file: &InputFile,
        schemas: &SchemaCache,
        planner: &BatchPlanner,
        dispatcher: &Dispatcher,
        stats: &StatsAggregator,
    ) -> Result<FileResult, LoadError> {
        let Some(table) = file.table.as_deref() else {
            warn!(file = %file.name, "No table mapping for file, skipping");
            return Ok(FileResult::skipped(&file.name, "no table mapping for file prefix"));
        };
        let Some(schema) = schemas.get(table) else {
            let reason = format!("schema for '{table}' not resolved");
            return Ok(FileResult::error(&file.name, table, reason));
        };

        let records = match JsonRecordSource::new(file.path.clone()).read_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(file = %file.name, error = %e, "Could not read input file");
                return Ok(FileResult::error(&file.name, table, e.to_string()));
            }
        };

        let batches = planner.plan(file_index, table, &file.name, records);
        info!(
            file = %file.name,
            table = %table,
            batches = batches.len(),
            "Loading file"
        );
        stats.begin_file(&file.name, batches.len() as u64).await?;

        let report = dispatcher.dispatch(batches, schema).await?;

        let mut result = FileResult {
            filename: file.name.clone(),
            table: Some(table.to_string()),
            status: FileStatus::Success,
            records_processed: report.records_processed,
            records_inserted: report.records_inserted,
            batches: report.executed() as u64,
            failed_batches: report.failed as u64,
            reason: None,
        };
        if report.failed > 0 {
            result.status = FileStatus::Error;
            result.reason = Some(format!(
                "{} of {} batches failed",
                report.failed,
                report.executed()
            ));
        } else if report.dropped > 0 {
            result.reason = Some(format!("{} batches not started", report.dropped));
        }
        Ok(result)
    }
}

/// Leaves a failed `migration_results.json` behind unless the run already
/// finalized one.
async fn write_aborted_results(record: &RunRecord, artifacts: &RunArtifacts, message: &str) {
    match artifacts.read_results().await {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => warn!(run_id = %record.run_id, error = %e, "Could not read run results"),
    }
    let summary = RunSummary::aborted(record, message);
    if let Err(e) = artifacts.write_results(&summary).await {
        warn!(run_id = %record.run_id, error = %e, "Could not write failed run results");
    }
}

/// Row counts per table. Tables that cannot be counted are left out.
async fn table_counts(pool: &ConnectionPool, tables: &[String]) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    let mut handle = match pool.acquire().await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "No connection for table counts");
            return counts;
        }
    };

    if let Some(conn) = handle.connection() {
        for table in tables {
            match conn.count_rows(table).await {
                Ok(n) => {
                    counts.insert(table.clone(), n);
                }
                Err(e) => warn!(table = %table, error = %e, "Could not count rows"),
            }
        }
    }
    handle.release();
    counts
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
