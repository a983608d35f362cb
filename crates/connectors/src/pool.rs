//! Bounded pool of destination connections.
//!
//! Admission is a semaphore with one permit per connection slot, so at most
//! `max_connections` handles are out at any time. A handle gives its
//! connection back exactly once, either through [`PooledConnection::release`]
//! or when it is dropped.

use crate::{
    error::PoolError,
    sql::base::connection::{ConnectionFactory, SqlConnection},
};
use futures_util::future::try_join_all;
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_connections: usize,
    pub idle: usize,
    pub in_use: usize,
    pub peak_in_use: usize,
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<Vec<Box<dyn SqlConnection>>>,
    semaphore: Arc<Semaphore>,
    max_connections: usize,
    acquire_timeout: Duration,
    closed: AtomicBool,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
    next_handle: AtomicU64,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, Vec<Box<dyn SqlConnection>>> {
        // The idle list is always left consistent, so a poisoned lock is still usable.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn give_back(&self, conn: Box<dyn SqlConnection>, broken: bool) {
        if broken || conn.is_closed() {
            debug!("Discarding broken connection");
        } else if self.closed.load(Ordering::Acquire) {
            debug!("Pool closed, dropping returned connection");
        } else {
            self.idle().push(conn);
        }
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Opens `max_connections` connections up front.
    pub async fn open(
        factory: Arc<dyn ConnectionFactory>,
        max_connections: usize,
        acquire_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let max_connections = max_connections.max(1);
        let conns = try_join_all((0..max_connections).map(|_| factory.connect())).await?;

        info!(
            destination = %factory.describe(),
            connections = max_connections,
            timeout_ms = acquire_timeout.as_millis() as u64,
            "Connection pool opened"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                idle: Mutex::new(conns),
                semaphore: Arc::new(Semaphore::new(max_connections)),
                max_connections,
                acquire_timeout,
                closed: AtomicBool::new(false),
                in_use: AtomicUsize::new(0),
                peak_in_use: AtomicUsize::new(0),
                next_handle: AtomicU64::new(1),
            }),
        })
    }

    /// Waits for a free slot for at most the configured timeout.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let started = Instant::now();
        let permit = match tokio::time::timeout(
            inner.acquire_timeout,
            inner.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                warn!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    max = inner.max_connections,
                    "Connection pool exhausted"
                );
                return Err(PoolError::Exhausted {
                    waited: started.elapsed(),
                    max: inner.max_connections,
                });
            }
        };

        let reusable = {
            let mut idle = inner.idle();
            idle.retain(|conn| !conn.is_closed());
            idle.pop()
        };

        // The permit is released on the error path when it goes out of scope.
        let conn = match reusable {
            Some(conn) => conn,
            None => inner.factory.connect().await?,
        };

        let now_in_use = inner.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        inner.peak_in_use.fetch_max(now_in_use, Ordering::AcqRel);

        Ok(PooledConnection {
            id: inner.next_handle.fetch_add(1, Ordering::Relaxed),
            conn: Some(conn),
            permit: Some(permit),
            pool: Arc::clone(inner),
            broken: false,
        })
    }

    /// Returns a connection to the pool. Same as [`PooledConnection::release`].
    pub fn release(&self, conn: &mut PooledConnection) -> bool {
        conn.release()
    }

    /// Closes the pool: waiters and later `acquire` calls fail with
    /// [`PoolError::Closed`], idle connections are dropped now and handed-out
    /// ones when they come back. Returns the number of idle connections closed.
    pub fn close_all(&self) -> usize {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::Release);
        inner.semaphore.close();
        let drained: Vec<_> = inner.idle().drain(..).collect();
        let count = drained.len();
        drop(drained);
        info!(
            closed = count,
            in_use = inner.in_use.load(Ordering::Acquire),
            "Connection pool closed"
        );
        count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.inner.acquire_timeout
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_connections: self.inner.max_connections,
            idle: self.inner.idle().len(),
            in_use: self.inner.in_use.load(Ordering::Acquire),
            peak_in_use: self.inner.peak_in_use.load(Ordering::Acquire),
        }
    }
}

/// A connection checked out of the pool.
pub struct PooledConnection {
    id: u64,
    conn: Option<Box<dyn SqlConnection>>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
    broken: bool,
}

impl PooledConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The underlying connection, or `None` once released.
    pub fn connection(&mut self) -> Option<&mut (dyn SqlConnection + 'static)> {
        self.conn.as_deref_mut()
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// Keeps the connection from being reused after release.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Gives the connection back. Returns `false` when this handle was
    /// already released; the second call changes nothing.
    pub fn release(&mut self) -> bool {
        let Some(conn) = self.conn.take() else {
            warn!(handle = self.id, "Connection released twice, ignoring");
            return false;
        };
        self.pool.give_back(conn, self.broken);
        self.permit.take();
        true
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn, self.broken);
        }
        self.permit.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::base::{
        connection::{InsertFailure, InsertStatement, InsertTimings},
        error::{ConnectorError, DbError},
    };
    use async_trait::async_trait;
    use model::core::schema::ColumnSchema;

    struct NullConnection {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SqlConnection for NullConnection {
        async fn table_columns(&self, _table: &str) -> Result<Vec<ColumnSchema>, DbError> {
            Ok(vec![])
        }

        async fn insert_batch(
            &mut self,
            _statements: &[InsertStatement],
        ) -> Result<InsertTimings, InsertFailure> {
            Ok(InsertTimings::default())
        }

        async fn count_rows(&self, _table: &str) -> Result<i64, DbError> {
            Ok(0)
        }

        async fn ping(&self) -> Result<(), DbError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        opened: AtomicUsize,
        closed_flag: Arc<AtomicBool>,
        fail: bool,
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        async fn connect(&self) -> Result<Box<dyn SqlConnection>, ConnectorError> {
            if self.fail {
                return Err(ConnectorError::Other("refused".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullConnection {
                closed: Arc::clone(&self.closed_flag),
            }))
        }
    }

    async fn pool(max: usize, timeout_ms: u64) -> (ConnectionPool, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let pool = ConnectionPool::open(factory.clone(), max, Duration::from_millis(timeout_ms))
            .await
            .unwrap();
        (pool, factory)
    }

    #[tokio::test]
    async fn test_opens_connections_eagerly() {
        let (pool, factory) = pool(3, 100).await;
        assert_eq!(factory.opened.load(Ordering::SeqCst), 3);
        assert_eq!(pool.stats().idle, 3);
    }

    #[tokio::test]
    async fn test_open_fails_when_factory_fails() {
        let factory = Arc::new(CountingFactory {
            fail: true,
            ..Default::default()
        });
        let result = ConnectionPool::open(factory, 2, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(PoolError::Connect(_))));
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let (pool, _) = pool(1, 50).await;
        let _held = pool.acquire().await.unwrap();

        let err = pool.acquire().await.err().unwrap();
        match err {
            PoolError::Exhausted { waited, max } => {
                assert!(waited >= Duration::from_millis(50));
                assert_eq!(max, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_double_release_is_harmless() {
        let (pool, _) = pool(2, 50).await;
        let mut a = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().in_use, 1);

        assert!(pool.release(&mut a));
        assert!(!pool.release(&mut a));
        assert!(a.connection().is_none());
        drop(a);

        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 2);

        // Both slots are still usable.
        let _x = pool.acquire().await.unwrap();
        let _y = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().in_use, 2);
    }

    #[tokio::test]
    async fn test_drop_returns_connection() {
        let (pool, factory) = pool(1, 50).await;
        {
            let _conn = pool.acquire().await.unwrap();
        }
        let _again = pool.acquire().await.unwrap();
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broken_connection_is_replaced() {
        let (pool, factory) = pool(1, 50).await;
        let mut conn = pool.acquire().await.unwrap();
        conn.mark_broken();
        conn.release();
        assert_eq!(pool.stats().idle, 0);

        let _fresh = pool.acquire().await.unwrap();
        assert_eq!(factory.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_all_after_partial_activity() {
        let (pool, _) = pool(3, 50).await;
        let mut held = pool.acquire().await.unwrap();

        assert_eq!(pool.close_all(), 2);
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));

        held.release();
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.in_use, 0);

        // Closing twice is fine.
        assert_eq!(pool.close_all(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_max_connections() {
        let (pool, _) = pool(3, 5_000).await;
        let mut tasks = Vec::new();
        for _ in 0..24 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                conn.release();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = pool.stats();
        assert!(stats.peak_in_use <= 3);
        assert_eq!(stats.in_use, 0);
    }
}
