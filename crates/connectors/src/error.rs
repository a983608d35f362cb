use crate::sql::base::error::{ConnectorError, DbError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within the acquisition timeout.
    #[error("connection pool exhausted: no connection available after {waited:?} (max {max})")]
    Exhausted { waited: Duration, max: usize },

    /// The pool has been closed and hands out no more connections.
    #[error("connection pool is closed")]
    Closed,

    /// Opening a new connection failed.
    #[error("failed to open connection: {0}")]
    Connect(#[from] ConnectorError),
}

#[derive(Debug, Error)]
pub enum SchemaError {
    /// The destination table does not exist or has no insertable columns.
    #[error("table '{0}' not found or has no insertable columns")]
    TableNotFound(String),

    /// Reading the catalog failed.
    #[error("failed to introspect table '{table}': {source}")]
    Introspection {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("no connection for schema resolution: {0}")]
    Pool(#[from] PoolError),
}
