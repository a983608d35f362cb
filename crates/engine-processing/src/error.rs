use connectors::{
    error::PoolError,
    sql::base::{
        connection::{InsertFailure, InsertPhase},
        error::DbError,
    },
};
use engine_core::error::StatsError;
use model::execution::metric::BatchErrorKind;
use thiserror::Error;

/// Failure of one batch. Never escapes the batch boundary: the executor turns
/// it into a failed metric.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch insert failed during {phase}: {source}")]
    Insert {
        phase: InsertPhase,
        #[source]
        source: DbError,
    },

    #[error("{0}")]
    Pool(#[from] PoolError),

    #[error("Pooled connection was already released")]
    ConnectionReleased,
}

impl BatchError {
    pub fn kind(&self) -> BatchErrorKind {
        match self {
            BatchError::Pool(PoolError::Exhausted { .. }) => BatchErrorKind::PoolExhausted,
            _ => BatchErrorKind::Insert,
        }
    }
}

impl From<InsertFailure> for BatchError {
    fn from(failure: InsertFailure) -> Self {
        BatchError::Insert {
            phase: failure.phase,
            source: failure.source,
        }
    }
}

/// A record whose values cannot be bound to the destination columns.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Field '{field}' holds an unsupported {found} value")]
pub struct ValidationError {
    pub field: String,
    pub found: &'static str,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to record batch statistics: {0}")]
    Stats(#[from] StatsError),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
