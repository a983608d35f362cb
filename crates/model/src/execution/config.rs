use crate::core::schema::{CompositeKey, SystemColumns};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, num::NonZeroUsize, path::PathBuf, time::Duration};

pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// Immutable settings for one run. Built once and passed by reference to every
/// component; nothing downstream reads the process environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub batch_size: NonZeroUsize,
    pub concurrency: NonZeroUsize,
    pub tables: Vec<String>,
    pub cloud_provider: String,
    pub instance_type: String,
    pub output_dir: PathBuf,
    pub acquire_timeout_ms: u64,
    /// Batch log is flushed every `snapshot_interval` recorded batches.
    pub snapshot_interval: NonZeroUsize,
    pub system_columns: SystemColumns,
    pub composite_keys: BTreeMap<String, CompositeKey>,
    pub collect_table_counts: bool,
}

impl RunConfig {
    pub fn new(batch_size: NonZeroUsize, concurrency: NonZeroUsize) -> Self {
        Self {
            batch_size,
            concurrency,
            tables: Vec::new(),
            cloud_provider: "Unknown".to_string(),
            instance_type: "Unknown".to_string(),
            output_dir: PathBuf::from("migration_outputs"),
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            snapshot_interval: NonZeroUsize::MIN,
            system_columns: SystemColumns::default(),
            composite_keys: BTreeMap::new(),
            collect_table_counts: false,
        }
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_labels(mut self, provider: &str, instance: &str) -> Self {
        self.cloud_provider = provider.to_string();
        self.instance_type = instance.to_string();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: NonZeroUsize) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_composite_key(mut self, table: &str, key: CompositeKey) -> Self {
        self.composite_keys.insert(table.to_string(), key);
        self
    }

    pub fn with_system_columns(mut self, columns: SystemColumns) -> Self {
        self.system_columns = columns;
        self
    }

    pub fn with_table_counts(mut self, enabled: bool) -> Self {
        self.collect_table_counts = enabled;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn composite_key(&self, table: &str) -> Option<&CompositeKey> {
        self.composite_keys.get(table)
    }
}
