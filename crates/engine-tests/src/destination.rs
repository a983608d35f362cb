//! In-process stand-in for the Postgres destination.

use crate::POISON;
use async_trait::async_trait;
use connectors::sql::base::{
    connection::{
        ConnectionFactory, InsertFailure, InsertPhase, InsertStatement, InsertTimings,
        SqlConnection,
    },
    error::{ConnectorError, DbError},
};
use model::core::schema::ColumnSchema;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub type Row = Vec<Option<String>>;

pub struct MockDestination {
    tables: HashMap<String, Vec<ColumnSchema>>,
    latency: Duration,
    rows: Mutex<HashMap<String, Vec<Row>>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    connections: AtomicUsize,
    rejected: AtomicUsize,
}

impl MockDestination {
    pub fn new(tables: Vec<(&str, Vec<ColumnSchema>)>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            tables: tables
                .into_iter()
                .map(|(name, columns)| (name.to_string(), columns))
                .collect(),
            latency,
            rows: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        })
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn ConnectionFactory> {
        Arc::new(MockFactory(Arc::clone(self)))
    }

    /// Committed rows of `table`, in commit order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.rows
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Highest number of inserts seen in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn connections_opened(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn rejected_batches(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn commit(&self, statements: &[InsertStatement]) -> Result<u64, DbError> {
        if statements
            .iter()
            .flat_map(|s| s.params.iter())
            .any(|p| p.as_deref() == Some(POISON))
        {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(DbError::Write(
                "new row violates check constraint \"items_name_check\"".into(),
            ));
        }

        let mut committed = 0;
        let mut rows = self.rows.lock().unwrap();
        for statement in statements {
            let table = statement.sql.split('"').nth(1).unwrap_or_default().to_string();
            let width = statement.params.len() / statement.rows.max(1);
            let target = rows.entry(table).or_default();
            for row in statement.params.chunks(width.max(1)) {
                target.push(row.to_vec());
                committed += 1;
            }
        }
        Ok(committed)
    }
}

struct MockFactory(Arc<MockDestination>);

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self) -> Result<Box<dyn SqlConnection>, ConnectorError> {
        self.0.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            dest: Arc::clone(&self.0),
        }))
    }

    fn describe(&self) -> String {
        "mock://destination".to_string()
    }
}

struct MockConnection {
    dest: Arc<MockDestination>,
}

#[async_trait]
impl SqlConnection for MockConnection {
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, DbError> {
        Ok(self.dest.tables.get(table).cloned().unwrap_or_default())
    }

    async fn insert_batch(
        &mut self,
        statements: &[InsertStatement],
    ) -> Result<InsertTimings, InsertFailure> {
        let now = self.dest.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.dest.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.dest.latency).await;
        let outcome = self.dest.commit(statements);
        self.dest.active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(rows_affected) => Ok(InsertTimings {
                execution: self.dest.latency,
                commit: Duration::from_micros(100),
                rows_affected,
            }),
            Err(source) => Err(InsertFailure {
                phase: InsertPhase::Execute,
                source,
                timings: InsertTimings {
                    execution: self.dest.latency,
                    ..Default::default()
                },
            }),
        }
    }

    async fn count_rows(&self, table: &str) -> Result<i64, DbError> {
        if !self.dest.tables.contains_key(table) {
            return Err(DbError::Unknown(format!("relation \"{table}\" does not exist")));
        }
        Ok(self.dest.rows(table).len() as i64)
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}
