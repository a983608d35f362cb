use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any Postgres driver error.
    #[error("SQL error: {0}")]
    Sql(#[from] tokio_postgres::Error),

    /// The connection was closed underneath the caller.
    #[error("connection is closed")]
    Closed,

    /// Writing rows to the database failed at the application level.
    #[error("Write error: {0}")]
    Write(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors happening while opening a connection.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection failed: {0}")]
    Other(String),
}
