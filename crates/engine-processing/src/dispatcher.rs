//! Bounded worker pool over a shared batch queue.
//!
//! Batches are submitted in planning order; `concurrency` workers each take
//! the next batch and run it to completion before taking another. Once the
//! cancellation token fires, in-flight batches finish and everything still
//! queued is dropped.

use crate::{error::DispatchError, executor::BatchExecutor};
use engine_core::metrics::StatsAggregator;
use futures::future::try_join_all;
use model::{core::schema::TableSchema, execution::metric::BatchMetric, records::batch::Batch};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Planned but never started because of cancellation.
    pub dropped: usize,
    pub records_processed: u64,
    pub records_inserted: u64,
}

impl DispatchReport {
    pub fn executed(&self) -> usize {
        self.succeeded + self.failed
    }

    fn add(&mut self, metric: &BatchMetric) {
        if metric.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.records_processed += metric.records_count as u64;
        self.records_inserted += metric.committed_records();
    }

    fn merge(&mut self, other: DispatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.dropped += other.dropped;
        self.records_processed += other.records_processed;
        self.records_inserted += other.records_inserted;
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    executor: BatchExecutor,
    stats: StatsAggregator,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        executor: BatchExecutor,
        stats: StatsAggregator,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            stats,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Runs every batch of one file. Every started batch reaches the stats
    /// aggregator before this returns.
    pub async fn dispatch(
        &self,
        batches: Vec<Batch>,
        schema: Arc<TableSchema>,
    ) -> Result<DispatchReport, DispatchError> {
        let planned = batches.len();
        let (tx, rx) = mpsc::channel::<Batch>(self.concurrency);
        let rx = Arc::new(Mutex::new(rx));

        let producer = {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut sent = 0usize;
                for batch in batches {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        res = tx.send(batch) => {
                            if res.is_err() {
                                break;
                            }
                            sent += 1;
                        }
                    }
                }
                planned - sent
            })
        };

        let workers: Vec<_> = (0..self.concurrency)
            .map(|worker| {
                let rx = rx.clone();
                let executor = self.executor.clone();
                let stats = self.stats.clone();
                let cancel = self.cancel.clone();
                let schema = schema.clone();

                tokio::spawn(async move {
                    let mut report = DispatchReport::default();
                    loop {
                        let next = { rx.lock().await.recv().await };
                        let Some(batch) = next else { break };

                        if cancel.is_cancelled() {
                            debug!(worker, batch = batch.batch_number(), "Dropping queued batch");
                            report.dropped += 1;
                            continue;
                        }

                        let metric = executor.execute(&batch, &schema).await;
                        report.add(&metric);
                        stats.record_batch(metric).await?;
                    }
                    Ok::<_, DispatchError>(report)
                })
            })
            .collect();
        // Workers own the only receivers now; if they all stop, the producer's send fails.
        drop(rx);

        let results = try_join_all(workers).await?;
        let unsent = producer.await?;

        let mut report = DispatchReport {
            planned,
            dropped: unsent,
            ..Default::default()
        };
        for worker in results {
            report.merge(worker?);
        }

        if report.dropped > 0 {
            info!(
                table = %schema.table,
                executed = report.executed(),
                dropped = report.dropped,
                "Dispatch stopped early"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::{
        pool::ConnectionPool,
        sql::base::{
            connection::{
                ConnectionFactory, InsertFailure, InsertStatement, InsertTimings, SqlConnection,
            },
            error::{ConnectorError, DbError},
        },
    };
    use engine_core::{artifacts::RunArtifacts, metrics::RunOutcome};
    use model::{
        core::{schema::ColumnSchema, value::Value},
        execution::config::RunConfig,
        records::record::Record,
    };
    use planner::batch::BatchPlanner;
    use std::{
        num::NonZeroUsize,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tempfile::TempDir;

    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
        inserts: AtomicUsize,
    }

    struct SlowConnection {
        gauge: Arc<Gauge>,
        latency: Duration,
    }

    #[async_trait]
    impl SqlConnection for SlowConnection {
        async fn table_columns(&self, _table: &str) -> Result<Vec<ColumnSchema>, DbError> {
            Ok(Vec::new())
        }

        async fn insert_batch(
            &mut self,
            statements: &[InsertStatement],
        ) -> Result<InsertTimings, InsertFailure> {
            let now = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.gauge.active.fetch_sub(1, Ordering::SeqCst);
            self.gauge.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(InsertTimings {
                execution: self.latency,
                commit: Duration::ZERO,
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

    struct SlowFactory {
        gauge: Arc<Gauge>,
        latency: Duration,
    }

    #[async_trait]
    impl ConnectionFactory for SlowFactory {
        async fn connect(&self) -> Result<Box<dyn SqlConnection>, ConnectorError> {
            Ok(Box::new(SlowConnection {
                gauge: self.gauge.clone(),
                latency: self.latency,
            }))
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        stats: StatsAggregator,
        gauge: Arc<Gauge>,
        cancel: CancellationToken,
        _dir: TempDir,
    }

    async fn harness(concurrency: usize, latency: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let gauge = Arc::new(Gauge::default());
        let config = Arc::new(RunConfig::new(
            NonZeroUsize::new(10).unwrap(),
            NonZeroUsize::new(concurrency).unwrap(),
        ));
        let pool = ConnectionPool::open(
            Arc::new(SlowFactory {
                gauge: gauge.clone(),
                latency,
            }),
            concurrency,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let stats = StatsAggregator::start("r", &config, 1, RunArtifacts::new(dir.path()))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            BatchExecutor::new(pool, config),
            stats.clone(),
            concurrency,
            cancel.clone(),
        );
        Harness {
            dispatcher,
            stats,
            gauge,
            cancel,
            _dir: dir,
        }
    }

    fn plan(records: usize) -> Vec<Batch> {
        let records = (0..records)
            .map(|i| [("name", Value::Int(i as i64))].into_iter().collect::<Record>())
            .collect();
        BatchPlanner::new(NonZeroUsize::new(10).unwrap()).plan(0, "t", "t.json", records)
    }

    fn schema() -> Arc<TableSchema> {
        Arc::new(TableSchema::new("t", vec![ColumnSchema::text("name")]))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let h = harness(5, Duration::from_millis(15)).await;

        let report = h.dispatcher.dispatch(plan(200), schema()).await.unwrap();
        assert_eq!(report.planned, 20);
        assert_eq!(report.succeeded, 20);
        assert_eq!(report.records_inserted, 200);
        assert!(h.gauge.peak.load(Ordering::SeqCst) <= 5);
        assert!(h.gauge.peak.load(Ordering::SeqCst) > 1);

        let log = h.stats.batch_log().await;
        let numbers: Vec<u64> = log.iter().map(|m| m.batch_number).collect();
        assert_eq!(numbers, (1..=20).collect::<Vec<_>>());
        assert_eq!(log.last().unwrap().cumulative_records, 200);
    }

    #[tokio::test]
    async fn test_single_worker_runs_in_order() {
        let h = harness(1, Duration::ZERO).await;
        let report = h.dispatcher.dispatch(plan(100), schema()).await.unwrap();

        assert_eq!(report.executed(), 10);
        assert_eq!(h.gauge.peak.load(Ordering::SeqCst), 1);
        let summary = h.stats.finalize(RunOutcome::default()).await.unwrap();
        assert_eq!(summary.total_records, 100);
        assert_eq!(summary.failed_batches, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let h = harness(2, Duration::ZERO).await;
        h.cancel.cancel();

        let report = h.dispatcher.dispatch(plan(50), schema()).await.unwrap();
        assert_eq!(report.executed(), 0);
        assert_eq!(report.dropped, 5);
        assert_eq!(h.gauge.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_lets_in_flight_batches_finish() {
        let h = harness(2, Duration::from_millis(20)).await;
        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let report = h.dispatcher.dispatch(plan(300), schema()).await.unwrap();
        assert!(report.executed() > 0);
        assert!(report.executed() < 30);
        assert_eq!(report.executed() + report.dropped, 30);
        assert_eq!(report.failed, 0);
        assert_eq!(h.gauge.inserts.load(Ordering::SeqCst), report.executed());
        assert_eq!(h.stats.batch_log().await.len(), report.executed());
    }
}
