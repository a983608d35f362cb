use crate::error::CliError;
use connectors::sql::{
    base::connection::{ConnectionFactory, SqlConnection},
    postgres::connection::{PgConnection, PgConnectionFactory},
};
use std::time::Instant;
use tracing::{error, info};

/// Opens one destination connection and runs a trivial query on it.
pub struct PostgresConnectionPinger {
    pub conn_str: String,
}

impl PostgresConnectionPinger {
    pub async fn ping(&self) -> Result<(), CliError> {
        let target = PgConnectionFactory::new(&self.conn_str)?.describe();
        let started = Instant::now();

        let conn = match PgConnection::connect(&self.conn_str).await {
            Ok(conn) => conn,
            Err(e) => {
                error!(target = %target, error = %e, "Postgres connection failed");
                return Err(e.into());
            }
        };

        conn.ping().await.map_err(|e| {
            error!(target = %target, error = %e, "Postgres ping failed");
            CliError::Database(e)
        })?;

        info!(
            target = %target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Postgres connection successful"
        );
        Ok(())
    }
}
