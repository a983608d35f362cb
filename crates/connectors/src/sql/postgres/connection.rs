use crate::sql::{
    base::{
        connection::{
            ConnectionFactory, InsertFailure, InsertPhase, InsertStatement, InsertTimings,
            SqlConnection,
        },
        error::{ConnectorError, DbError},
    },
    postgres::{
        params::PgParamStore,
        utils::{connect_client, parse_config},
    },
};
use async_trait::async_trait;
use model::core::schema::ColumnSchema;
use planner::query::dialect::{Dialect, Postgres};
use std::time::Instant;
use tokio_postgres::{Client, Config};
use tracing::{debug, warn};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");

pub struct PgConnection {
    client: Client,
    dialect: Postgres,
}

impl PgConnection {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let config = parse_config(url)?;
        Self::connect_with(&config).await
    }

    pub async fn connect_with(config: &Config) -> Result<Self, ConnectorError> {
        let client = connect_client(config).await?;
        Ok(PgConnection {
            client,
            dialect: Postgres,
        })
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, DbError> {
        let rows = self.client.query(QUERY_TABLE_COLUMNS_SQL, &[&table]).await?;
        let columns = rows
            .iter()
            .map(|row| {
                Ok(ColumnSchema {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    udt_schema: row.try_get(2)?,
                    udt_name: row.try_get(3)?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()?;
        Ok(columns)
    }

    async fn insert_batch(
        &mut self,
        statements: &[InsertStatement],
    ) -> Result<InsertTimings, InsertFailure> {
        let mut timings = InsertTimings::default();

        let tx = self
            .client
            .transaction()
            .await
            .map_err(|e| InsertFailure {
                phase: InsertPhase::Begin,
                source: e.into(),
                timings,
            })?;

        let exec_start = Instant::now();
        for stmt in statements {
            let bindings = PgParamStore::new(&stmt.params);
            match tx.execute(stmt.sql.as_str(), &bindings.as_refs()).await {
                Ok(affected) => timings.rows_affected += affected,
                Err(err) => {
                    timings.execution = exec_start.elapsed();
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback after failed insert failed");
                    }
                    return Err(InsertFailure {
                        phase: InsertPhase::Execute,
                        source: err.into(),
                        timings,
                    });
                }
            }
        }
        timings.execution = exec_start.elapsed();

        let commit_start = Instant::now();
        let committed = tx.commit().await;
        timings.commit = commit_start.elapsed();
        committed.map_err(|e| InsertFailure {
            phase: InsertPhase::Commit,
            source: e.into(),
            timings,
        })?;

        debug!(
            statements = statements.len(),
            rows = timings.rows_affected,
            "Insert transaction committed"
        );
        Ok(timings)
    }

    async fn count_rows(&self, table: &str) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.dialect.quote_identifier(table));
        let row = self.client.query_one(sql.as_str(), &[]).await?;
        Ok(row.try_get(0)?)
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

/// Opens Postgres connections from a parsed connection config.
#[derive(Clone)]
pub struct PgConnectionFactory {
    config: Config,
}

impl PgConnectionFactory {
    pub fn new(url: &str) -> Result<Self, ConnectorError> {
        Ok(Self {
            config: parse_config(url)?,
        })
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn SqlConnection>, ConnectorError> {
        let conn = PgConnection::connect_with(&self.config).await?;
        Ok(Box::new(conn))
    }

    fn describe(&self) -> String {
        let hosts = self
            .config
            .get_hosts()
            .iter()
            .map(|h| match h {
                tokio_postgres::config::Host::Tcp(name) => name.clone(),
                #[cfg(unix)]
                tokio_postgres::config::Host::Unix(path) => path.display().to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "postgres://{}/{}",
            hosts,
            self.config.get_dbname().unwrap_or_default()
        )
    }
}
