use crate::records::batch::BatchKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorKind {
    Insert,
    PoolExhausted,
}

impl BatchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchErrorKind::Insert => "insert",
            BatchErrorKind::PoolExhausted => "pool_exhausted",
        }
    }
}

impl fmt::Display for BatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that could not be coerced into the destination schema and was
/// left out of its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRecord {
    pub offset: u64,
    pub reason: String,
}

/// Phase timings in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub pool_wait_time: f64,
    pub data_preparation_time: f64,
    pub query_execution_time: f64,
    pub commit_time: f64,
}

impl PhaseTimings {
    pub fn network_db_time(&self) -> f64 {
        self.query_execution_time + self.commit_time
    }
}

/// Outcome of one executed batch, as written to the batch log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetric {
    pub file_index: usize,
    pub batch_number: u64,
    pub table_name: String,
    pub source_file: String,
    pub planned_records: usize,
    /// Rows sent to the destination (planned minus dropped).
    pub records_count: usize,
    pub dropped_records: Vec<DroppedRecord>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_seconds: f64,
    pub pool_wait_time: f64,
    pub data_preparation_time: f64,
    pub query_execution_time: f64,
    pub commit_time: f64,
    pub network_db_time: f64,
    pub overhead_time: f64,
    pub records_per_second: f64,
    /// Filled by the aggregator from the planning-order fold, never by the executor.
    pub cumulative_records: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<BatchErrorKind>,
}

/// Identity of a batch as carried into its metric.
#[derive(Debug, Clone)]
pub struct BatchIdentity {
    pub key: BatchKey,
    pub table_name: String,
    pub source_file: String,
    pub planned_records: usize,
}

impl BatchMetric {
    pub fn succeeded(
        identity: BatchIdentity,
        records_count: usize,
        dropped_records: Vec<DroppedRecord>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        timings: PhaseTimings,
    ) -> Self {
        let mut metric = Self::base(identity, start_time, end_time, timings);
        metric.records_count = records_count;
        metric.dropped_records = dropped_records;
        metric.records_per_second = if metric.total_duration_seconds > 0.0 {
            records_count as f64 / metric.total_duration_seconds
        } else {
            0.0
        };
        metric
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        identity: BatchIdentity,
        records_count: usize,
        dropped_records: Vec<DroppedRecord>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        timings: PhaseTimings,
        kind: BatchErrorKind,
        error: String,
    ) -> Self {
        let mut metric = Self::base(identity, start_time, end_time, timings);
        metric.records_count = records_count;
        metric.dropped_records = dropped_records;
        metric.success = false;
        metric.error = Some(error);
        metric.error_kind = Some(kind);
        metric
    }

    fn base(
        identity: BatchIdentity,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        timings: PhaseTimings,
    ) -> Self {
        let total = (end_time - start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let network = timings.network_db_time();
        let overhead = (total - timings.data_preparation_time - network - timings.pool_wait_time).max(0.0);

        Self {
            file_index: identity.key.file_index,
            batch_number: identity.key.batch_number,
            table_name: identity.table_name,
            source_file: identity.source_file,
            planned_records: identity.planned_records,
            records_count: 0,
            dropped_records: Vec::new(),
            start_time,
            end_time,
            total_duration_seconds: total,
            pool_wait_time: timings.pool_wait_time,
            data_preparation_time: timings.data_preparation_time,
            query_execution_time: timings.query_execution_time,
            commit_time: timings.commit_time,
            network_db_time: network,
            overhead_time: overhead,
            records_per_second: 0.0,
            cumulative_records: 0,
            success: true,
            error: None,
            error_kind: None,
        }
    }

    pub fn key(&self) -> BatchKey {
        BatchKey {
            file_index: self.file_index,
            batch_number: self.batch_number,
        }
    }

    /// Rows committed by this batch. Zero for a failed batch.
    pub fn committed_records(&self) -> u64 {
        if self.success {
            self.records_count as u64
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity() -> BatchIdentity {
        BatchIdentity {
            key: BatchKey {
                file_index: 0,
                batch_number: 3,
            },
            table_name: "t".into(),
            source_file: "f.json".into(),
            planned_records: 10,
        }
    }

    #[test]
    fn success_metric_derives_throughput_and_overhead() {
        let start = Utc::now();
        let end = start + Duration::seconds(2);
        let timings = PhaseTimings {
            pool_wait_time: 0.1,
            data_preparation_time: 0.2,
            query_execution_time: 1.0,
            commit_time: 0.5,
        };

        let metric = BatchMetric::succeeded(identity(), 10, vec![], start, end, timings);
        assert!(metric.success);
        assert_eq!(metric.total_duration_seconds, 2.0);
        assert_eq!(metric.network_db_time, 1.5);
        assert!((metric.overhead_time - 0.2).abs() < 1e-9);
        assert_eq!(metric.records_per_second, 5.0);
        assert_eq!(metric.committed_records(), 10);
    }

    #[test]
    fn failed_metric_commits_nothing() {
        let start = Utc::now();
        let metric = BatchMetric::failed(
            identity(),
            10,
            vec![],
            start,
            start,
            PhaseTimings::default(),
            BatchErrorKind::Insert,
            "duplicate key".into(),
        );
        assert!(!metric.success);
        assert_eq!(metric.committed_records(), 0);
        assert_eq!(metric.error_kind, Some(BatchErrorKind::Insert));

        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["error_kind"], "insert");
    }
}
