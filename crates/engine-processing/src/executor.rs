//! Executes one batch against one pooled connection and reports its metric.

use crate::{error::BatchError, preparation::RowPreparer};
use chrono::{DateTime, Utc};
use connectors::{pool::ConnectionPool, sql::base::connection::InsertTimings};
use model::{
    core::schema::TableSchema,
    execution::{
        config::RunConfig,
        metric::{BatchIdentity, BatchMetric, DroppedRecord, PhaseTimings},
    },
    records::batch::Batch,
};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct BatchExecutor {
    pool: ConnectionPool,
    config: Arc<RunConfig>,
}

impl BatchExecutor {
    pub fn new(pool: ConnectionPool, config: Arc<RunConfig>) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Never fails: any error is contained in a failed metric. The connection
    /// is back in the pool by the time this returns.
    pub async fn execute(&self, batch: &Batch, schema: &TableSchema) -> BatchMetric {
        let start_time = Utc::now();
        let mut timings = PhaseTimings::default();
        let identity = BatchIdentity {
            key: batch.key,
            table_name: batch.table_name.clone(),
            source_file: batch.source_file.clone(),
            planned_records: batch.len(),
        };

        let waited = Instant::now();
        let acquired = self.pool.acquire().await;
        timings.pool_wait_time = waited.elapsed().as_secs_f64();
        let mut conn = match acquired {
            Ok(conn) => conn,
            Err(e) => {
                return self.failed(identity, batch.len(), Vec::new(), start_time, timings, e.into());
            }
        };

        let prep_started = Instant::now();
        let preparer = RowPreparer::new(
            schema,
            self.config.composite_key(&batch.table_name),
            &self.config.system_columns,
        );
        let prepared = preparer.prepare(batch);
        timings.data_preparation_time = prep_started.elapsed().as_secs_f64();

        for dropped in &prepared.dropped {
            warn!(
                batch = batch.batch_number(),
                table = %batch.table_name,
                offset = dropped.offset,
                reason = %dropped.reason,
                "Record dropped from batch"
            );
        }

        let outcome = if prepared.is_empty() {
            debug!(batch = batch.batch_number(), "No rows left to insert");
            Ok(InsertTimings::default())
        } else {
            match conn.connection() {
                Some(c) => c.insert_batch(&prepared.statements).await.map_err(|failure| {
                    (failure.timings, BatchError::from(failure))
                }),
                None => Err((InsertTimings::default(), BatchError::ConnectionReleased)),
            }
        };

        if conn.connection().is_some_and(|c| c.is_closed()) {
            conn.mark_broken();
        }
        conn.release();

        match outcome {
            Ok(insert) => {
                timings.query_execution_time = insert.execution.as_secs_f64();
                timings.commit_time = insert.commit.as_secs_f64();
                let metric = BatchMetric::succeeded(
                    identity,
                    prepared.rows,
                    prepared.dropped,
                    start_time,
                    Utc::now(),
                    timings,
                );
                info!(
                    batch = metric.batch_number,
                    table = %metric.table_name,
                    records = metric.records_count,
                    duration_s = metric.total_duration_seconds,
                    "Batch {} for {}: {} records in {:.2}s ({:.1} rec/s)",
                    metric.batch_number,
                    metric.table_name,
                    metric.records_count,
                    metric.total_duration_seconds,
                    metric.records_per_second
                );
                metric
            }
            Err((insert, e)) => {
                timings.query_execution_time = insert.execution.as_secs_f64();
                timings.commit_time = insert.commit.as_secs_f64();
                self.failed(identity, prepared.rows, prepared.dropped, start_time, timings, e)
            }
        }
    }

    fn failed(
        &self,
        identity: BatchIdentity,
        records: usize,
        dropped: Vec<DroppedRecord>,
        start_time: DateTime<Utc>,
        timings: PhaseTimings,
        error: BatchError,
    ) -> BatchMetric {
        error!(
            batch = identity.key.batch_number,
            table = %identity.table_name,
            file = %identity.source_file,
            kind = %error.kind(),
            error = %error,
            "Batch failed"
        );
        BatchMetric::failed(
            identity,
            records,
            dropped,
            start_time,
            Utc::now(),
            timings,
            error.kind(),
            error.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::sql::base::{
        connection::{ConnectionFactory, InsertFailure, InsertPhase, InsertStatement, SqlConnection},
        error::{ConnectorError, DbError},
    };
    use model::{
        core::{schema::ColumnSchema, value::Value},
        execution::metric::BatchErrorKind,
        records::{
            batch::{BatchKey, PlannedRecord},
            record::Record,
        },
    };
    use std::{num::NonZeroUsize, sync::Mutex, time::Duration};

    #[derive(Default)]
    struct Recorded {
        statements: Vec<InsertStatement>,
    }

    struct FakeConnection {
        log: Arc<Mutex<Recorded>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SqlConnection for FakeConnection {
        async fn table_columns(&self, _table: &str) -> Result<Vec<ColumnSchema>, DbError> {
            Ok(Vec::new())
        }

        async fn insert_batch(
            &mut self,
            statements: &[InsertStatement],
        ) -> Result<InsertTimings, InsertFailure> {
            let poisoned = self.fail_on.is_some_and(|bad| {
                statements
                    .iter()
                    .flat_map(|s| s.params.iter())
                    .any(|p| p.as_deref() == Some(bad))
            });
            if poisoned {
                return Err(InsertFailure {
                    phase: InsertPhase::Execute,
                    source: DbError::Write("duplicate key value".into()),
                    timings: InsertTimings::default(),
                });
            }
            self.log.lock().unwrap().statements.extend_from_slice(statements);
            Ok(InsertTimings {
                execution: Duration::from_millis(2),
                commit: Duration::from_millis(1),
                rows_affected: statements.iter().map(|s| s.rows as u64).sum(),
            })
        }

        async fn count_rows(&self, _table: &str) -> Result<i64, DbError> {
            Ok(0)
        }

        async fn ping(&self) -> Result<(), DbError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    struct FakeFactory {
        log: Arc<Mutex<Recorded>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl ConnectionFactory for FakeFactory {
        async fn connect(&self) -> Result<Box<dyn SqlConnection>, ConnectorError> {
            Ok(Box::new(FakeConnection {
                log: self.log.clone(),
                fail_on: self.fail_on,
            }))
        }
    }

    async fn executor(fail_on: Option<&'static str>) -> (BatchExecutor, Arc<Mutex<Recorded>>) {
        let log = Arc::new(Mutex::new(Recorded::default()));
        let factory = Arc::new(FakeFactory {
            log: log.clone(),
            fail_on,
        });
        let pool = ConnectionPool::open(factory, 1, Duration::from_millis(50))
            .await
            .unwrap();
        let config = RunConfig::new(NonZeroUsize::new(3).unwrap(), NonZeroUsize::MIN)
            .with_composite_key("t", model::core::schema::CompositeKey::new("id", &["no"]));
        (BatchExecutor::new(pool, Arc::new(config)), log)
    }

    fn schema() -> TableSchema {
        TableSchema::new("t", vec![ColumnSchema::text("no"), ColumnSchema::text("name")])
    }

    fn batch(values: &[&str]) -> Batch {
        Batch {
            key: BatchKey {
                file_index: 0,
                batch_number: 2,
            },
            table_name: "t".into(),
            source_file: "t_1.json".into(),
            records: values
                .iter()
                .enumerate()
                .map(|(i, v)| PlannedRecord {
                    offset: 3 + i as u64,
                    record: [("no", Value::from(*v))].into_iter().collect::<Record>(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_successful_batch() {
        let (executor, log) = executor(None).await;
        let metric = executor.execute(&batch(&["a", "b", "c"]), &schema()).await;

        assert!(metric.success);
        assert_eq!(metric.records_count, 3);
        assert_eq!(metric.batch_number, 2);
        assert!(metric.query_execution_time > 0.0);
        assert_eq!(executor.pool().stats().in_use, 0);

        let recorded = log.lock().unwrap();
        assert_eq!(recorded.statements.len(), 1);
        assert_eq!(recorded.statements[0].params[0].as_deref(), Some("a_4"));
        assert!(recorded.statements[0].sql.contains(r#""createdAt", "updatedAt""#));
    }

    #[tokio::test]
    async fn test_insert_failure_is_contained() {
        let (executor, log) = executor(Some("b")).await;
        let metric = executor.execute(&batch(&["a", "b"]), &schema()).await;

        assert!(!metric.success);
        assert_eq!(metric.error_kind, Some(BatchErrorKind::Insert));
        assert!(metric.error.as_deref().unwrap().contains("duplicate key value"));
        assert_eq!(metric.committed_records(), 0);
        assert!(log.lock().unwrap().statements.is_empty());

        // The connection went back to the pool despite the failure.
        assert_eq!(executor.pool().stats().in_use, 0);
        assert!(executor.execute(&batch(&["c"]), &schema()).await.success);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_fails_the_batch() {
        let (executor, _) = executor(None).await;
        let held = executor.pool().acquire().await.unwrap();

        let metric = executor.execute(&batch(&["a"]), &schema()).await;
        assert!(!metric.success);
        assert_eq!(metric.error_kind, Some(BatchErrorKind::PoolExhausted));
        assert!(metric.pool_wait_time >= 0.04);

        drop(held);
        assert!(executor.execute(&batch(&["a"]), &schema()).await.success);
    }
}
