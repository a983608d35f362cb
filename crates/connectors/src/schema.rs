use crate::{error::SchemaError, pool::ConnectionPool, sql::base::connection::SqlConnection};
use model::core::schema::{SystemColumns, TableSchema};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

/// Loads destination column lists once per table and caches them.
pub struct SchemaResolver {
    system: SystemColumns,
    cache: HashMap<String, Arc<TableSchema>>,
}

impl SchemaResolver {
    pub fn new(system: SystemColumns) -> Self {
        Self {
            system,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(
        &mut self,
        conn: &dyn SqlConnection,
        table: &str,
    ) -> Result<Arc<TableSchema>, SchemaError> {
        if let Some(schema) = self.cache.get(table) {
            return Ok(Arc::clone(schema));
        }

        let columns = conn
            .table_columns(table)
            .await
            .map_err(|source| SchemaError::Introspection {
                table: table.to_string(),
                source,
            })?;

        // An unknown table yields no rows at all.
        if columns.is_empty() {
            return Err(SchemaError::TableNotFound(table.to_string()));
        }

        let insertable: Vec<_> = columns
            .into_iter()
            .filter(|c| !self.system.is_excluded(&c.name))
            .collect();
        if insertable.is_empty() {
            return Err(SchemaError::TableNotFound(table.to_string()));
        }

        info!(table = %table, columns = insertable.len(), "Resolved table schema");
        debug!(table = %table, columns = ?insertable.iter().map(|c| &c.name).collect::<Vec<_>>());

        let schema = Arc::new(TableSchema::new(table, insertable));
        self.cache.insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Resolves every table on one pooled connection and publishes the result.
    pub async fn resolve_all(
        mut self,
        pool: &ConnectionPool,
        tables: &[String],
    ) -> Result<SchemaCache, SchemaError> {
        let mut handle = pool.acquire().await?;
        let outcome = async {
            let conn = handle.connection().ok_or(crate::error::PoolError::Closed)?;
            for table in tables {
                self.resolve(conn, table).await?;
            }
            Ok::<_, SchemaError>(())
        }
        .await;
        handle.release();
        outcome?;

        Ok(self.publish())
    }

    pub fn publish(self) -> SchemaCache {
        SchemaCache {
            tables: Arc::new(self.cache),
        }
    }
}

/// Read-only view of resolved schemas, shared by all workers.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    tables: Arc<HashMap<String, Arc<TableSchema>>>,
}

impl SchemaCache {
    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(table).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
