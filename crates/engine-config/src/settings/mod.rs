use crate::mapping::TableMapping;
use batch_size::BatchSize;
use concurrency::Concurrency;
use model::execution::config::{DEFAULT_ACQUIRE_TIMEOUT_MS, RunConfig};
use std::{collections::HashMap, num::NonZeroUsize, path::PathBuf, time::Duration};

pub mod batch_size;
pub mod concurrency;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Everything the operator chooses for a load, before it is frozen into a
/// [`RunConfig`].
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub batch_size: BatchSize,
    pub concurrency: Concurrency,
    pub cloud_provider: String,
    pub instance_type: String,
    pub output_dir: PathBuf,
    pub acquire_timeout: Duration,
    pub snapshot_interval: NonZeroUsize,
    pub collect_table_counts: bool,
}

impl LoadSettings {
    pub fn new(batch_size: BatchSize, concurrency: Concurrency) -> Self {
        Self {
            batch_size,
            concurrency,
            cloud_provider: UNKNOWN_LABEL.to_string(),
            instance_type: UNKNOWN_LABEL.to_string(),
            output_dir: PathBuf::from("migration_outputs"),
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            snapshot_interval: NonZeroUsize::MIN,
            collect_table_counts: false,
        }
    }

    /// Provider and instance labels from `CLOUD_PROVIDER` / `INSTANCE_TYPE`.
    pub fn with_env_labels(mut self, vars: &HashMap<String, String>) -> Self {
        let (provider, instance) = labels_from_env(vars);
        self.cloud_provider = provider;
        self.instance_type = instance;
        self
    }

    pub fn to_run_config(&self, mapping: &TableMapping) -> RunConfig {
        let mut config = RunConfig::new(self.batch_size.get(), self.concurrency.get())
            .with_tables(mapping.tables())
            .with_labels(&self.cloud_provider, &self.instance_type)
            .with_output_dir(self.output_dir.clone())
            .with_acquire_timeout(self.acquire_timeout)
            .with_snapshot_interval(self.snapshot_interval)
            .with_system_columns(mapping.system_columns.clone())
            .with_table_counts(self.collect_table_counts);

        for rule in &mapping.rules {
            if let Some(key) = &rule.composite_key {
                config = config.with_composite_key(&rule.table, key.clone());
            }
        }
        config
    }
}

pub fn labels_from_env(vars: &HashMap<String, String>) -> (String, String) {
    let label = |key: &str| {
        vars.get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_LABEL)
            .to_string()
    };
    (label("CLOUD_PROVIDER"), label("INSTANCE_TYPE"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_default_to_unknown() {
        let mut vars = HashMap::new();
        assert_eq!(
            labels_from_env(&vars),
            ("Unknown".to_string(), "Unknown".to_string())
        );

        vars.insert("CLOUD_PROVIDER".to_string(), "GCP".to_string());
        vars.insert("INSTANCE_TYPE".to_string(), "  ".to_string());
        assert_eq!(
            labels_from_env(&vars),
            ("GCP".to_string(), "Unknown".to_string())
        );
    }

    #[test]
    fn test_run_config_carries_mapping() {
        let settings = LoadSettings::new(
            BatchSize::try_from(500).unwrap(),
            Concurrency::try_from(5).unwrap(),
        );
        let config = settings.to_run_config(&TableMapping::default());

        assert_eq!(config.batch_size.get(), 500);
        assert_eq!(config.concurrency.get(), 5);
        assert_eq!(config.tables.len(), 5);
        let key = config.composite_key("opn_std_scsbid_info").unwrap();
        assert_eq!(key.column, "id");
        assert_eq!(key.fields, vec!["bidNtceNo", "bidNtceOrd"]);
    }
}
