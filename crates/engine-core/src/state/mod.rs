use crate::error::RegistryError;
use async_trait::async_trait;
use model::execution::run::RunRecord;

pub mod jsonl_store;

/// Append-only store of run records. A later record for the same `run_id`
/// supersedes earlier ones.
#[async_trait]
pub trait RunIndex: Send + Sync {
    async fn append(&self, record: &RunRecord) -> Result<(), RegistryError>;

    /// Latest record per run, in first-seen order.
    async fn load(&self) -> Result<Vec<RunRecord>, RegistryError>;
}
