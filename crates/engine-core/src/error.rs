use model::execution::run::RunStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Failed to write run artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize run artifact: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run statistics were already finalized")]
    AlreadyFinalized,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Run registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize run record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Could not allocate an output directory for run {0}")]
    Allocation(String),
}
