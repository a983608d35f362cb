use crate::sql::base::error::{ConnectorError, DbError};
use async_trait::async_trait;
use model::core::schema::ColumnSchema;
use std::{fmt, time::Duration};

/// One rendered statement of a batch insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    pub params: Vec<Option<String>>,
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPhase {
    Begin,
    Execute,
    Commit,
}

impl InsertPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertPhase::Begin => "begin",
            InsertPhase::Execute => "execute",
            InsertPhase::Commit => "commit",
        }
    }
}

impl fmt::Display for InsertPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InsertTimings {
    pub execution: Duration,
    pub commit: Duration,
    pub rows_affected: u64,
}

/// A failed insert transaction. The transaction has been rolled back by the
/// time this is returned.
#[derive(Debug, thiserror::Error)]
#[error("insert failed during {phase}: {source}")]
pub struct InsertFailure {
    pub phase: InsertPhase,
    #[source]
    pub source: DbError,
    pub timings: InsertTimings,
}

/// A live connection to the destination store.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Columns of `table` in ordinal order, with case preserved.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, DbError>;

    /// Executes every statement inside a single transaction and commits it.
    async fn insert_batch(
        &mut self,
        statements: &[InsertStatement],
    ) -> Result<InsertTimings, InsertFailure>;

    async fn count_rows(&self, table: &str) -> Result<i64, DbError>;

    async fn ping(&self) -> Result<(), DbError>;

    fn is_closed(&self) -> bool;
}

/// Opens new destination connections for the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SqlConnection>, ConnectorError>;

    fn describe(&self) -> String {
        "destination".to_string()
    }
}
