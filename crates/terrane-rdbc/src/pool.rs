//! Connection pool management.
//!
//! Two layers live here:
//! - [`PoolRegistry`]: owns driver factories and the process-wide map from
//!   `(target, username)` to one shared [`ConnectionPool`]. Pool creation is
//!   single-flight: concurrent first-time callers observe exactly one
//!   construction and one validation run.
//! - [`ConnectionPool`]: a semaphore-capped pool of physical connections with
//!   creation-time validation, idle reuse, per-worker bound slots and an RAII
//!   borrow guard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, RwLock, Semaphore};
use tracing::{debug, error, warn};

use crate::config::{BackendConfig, DEFAULT_PORT};
use crate::connection::{Connection, ConnectionFactory};
use crate::descriptor::ConnectDescriptor;
use crate::error::{Error, Result};

/// Identifier of an execution context (a worker thread or task).
///
/// The outer framework assigns each worker a stable id and threads it through
/// every call; connection bindings are keyed by it explicitly instead of
/// hiding in thread-local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Create a worker id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for WorkerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Sizing and validation options applied when a pool is created.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum concurrently borrowed connections
    pub max_active: usize,
    /// Idle connections created eagerly
    pub min_idle: usize,
    /// Validate idle connections before handing them out
    pub keep_alive: bool,
    /// How long a borrow may wait for a free slot
    pub acquire_timeout: Duration,
    /// Query executed once against a fresh connection at pool creation
    pub validation_query: String,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_active: 10,
            min_idle: 1,
            keep_alive: true,
            acquire_timeout: Duration::from_secs(30),
            validation_query: "SELECT 1".into(),
        }
    }
}

impl PoolOptions {
    fn from_config(config: &BackendConfig) -> Self {
        Self {
            max_active: config.max_active,
            min_idle: config.min_idle,
            keep_alive: config.keep_alive,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            validation_query: config.validation_query.clone(),
        }
    }
}

/// Counters describing pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections created over the pool lifetime
    pub connections_created: u64,
    /// Connections closed or discarded
    pub connections_closed: u64,
    /// Successful borrows
    pub acquisitions: u64,
    /// Borrow attempts that timed out waiting for a slot
    pub exhausted_count: u64,
}

#[derive(Debug, Default)]
struct AtomicPoolStats {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    acquisitions: AtomicU64,
    exhausted_count: AtomicU64,
}

impl AtomicPoolStats {
    fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
        }
    }
}

/// A pool of physical connections for one `(target, credential)` key.
pub struct ConnectionPool {
    url: String,
    credentials: crate::config::Credentials,
    factory: Arc<dyn ConnectionFactory>,
    options: PoolOptions,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    bound: Mutex<HashMap<WorkerId, Arc<dyn Connection>>>,
    semaphore: Semaphore,
    total: AtomicUsize,
    stats: AtomicPoolStats,
    self_ref: OnceCell<Weak<ConnectionPool>>,
}

impl ConnectionPool {
    /// Create a pool and validate it with one synchronously executed query.
    ///
    /// Construction fails if the validation query errors or returns no rows.
    /// The validated connection seeds the idle set; additional connections are
    /// created up to `min_idle`.
    pub async fn open(
        url: String,
        credentials: crate::config::Credentials,
        options: PoolOptions,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Arc<Self>> {
        let pool = Arc::new(Self {
            semaphore: Semaphore::new(options.max_active),
            url,
            credentials,
            factory,
            options,
            idle: Mutex::new(Vec::new()),
            bound: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            stats: AtomicPoolStats::default(),
            self_ref: OnceCell::new(),
        });
        let _ = pool.self_ref.set(Arc::downgrade(&pool));

        let conn = pool.create_connection().await?;
        if let Err(e) = pool.validate(&*conn).await {
            if let Err(close_err) = conn.close().await {
                error!(error = %close_err, "failed to close connection after validation failure");
            }
            pool.discard_one();
            return Err(e);
        }

        pool.idle.lock().await.push(conn);
        for _ in 1..pool.options.min_idle {
            match pool.create_connection().await {
                Ok(conn) => pool.idle.lock().await.push(conn),
                Err(e) => {
                    warn!(error = %e, "failed to pre-create idle connection");
                    break;
                }
            }
        }

        debug!(url = %pool.url, "connection pool created");
        Ok(pool)
    }

    /// The rendered target text this pool connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Total connections currently owned by the pool (idle + borrowed).
    pub fn size(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    fn self_arc(&self) -> Result<Arc<Self>> {
        self.self_ref
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::internal("connection pool has been dropped"))
    }

    async fn create_connection(&self) -> Result<Box<dyn Connection>> {
        let conn = self
            .factory
            .connect(&self.url, &self.credentials)
            .await
            .map_err(|e| Error::connection_with_source("failed to open connection", e))?;
        self.total.fetch_add(1, Ordering::Release);
        self.stats.record_created();
        Ok(conn)
    }

    async fn validate(&self, conn: &dyn Connection) -> Result<()> {
        let rows = conn
            .query(&self.options.validation_query)
            .await
            .map_err(|e| Error::connection_with_source("failed to validate connection", e))?;
        if rows.is_empty() {
            return Err(Error::connection(
                "failed to validate connection: validation query returned no rows",
            ));
        }
        Ok(())
    }

    fn discard_one(&self) {
        self.total.fetch_sub(1, Ordering::Release);
        self.stats.record_closed();
    }

    /// Borrow one connection, blocking up to the configured acquire timeout.
    ///
    /// The returned guard gives the connection back to the idle set on drop.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let conn = self.acquire_raw().await?;
        Ok(PooledConnection::new(conn, self.self_arc()?))
    }

    async fn acquire_raw(&self) -> Result<Box<dyn Connection>> {
        let permit = tokio::time::timeout(self.options.acquire_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| {
                self.stats.record_exhausted();
                Error::timeout(format!(
                    "timed out waiting for a connection ({}ms)",
                    self.options.acquire_timeout.as_millis()
                ))
            })?
            .map_err(|_| Error::connection("connection pool closed"))?;

        let reused = loop {
            let entry = { self.idle.lock().await.pop() };
            match entry {
                Some(conn) => {
                    if conn.is_closed().await {
                        self.discard_one();
                        continue;
                    }
                    if self.options.keep_alive && !conn.is_valid().await {
                        self.discard_one();
                        continue;
                    }
                    break Some(conn);
                }
                None => break None,
            }
        };

        let conn = match reused {
            Some(conn) => conn,
            None => match self.create_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    drop(permit);
                    return Err(e);
                }
            },
        };

        self.stats.record_acquisition();
        // The permit travels with the borrowed connection; it is given back
        // when the connection is returned, released or discarded.
        std::mem::forget(permit);
        Ok(conn)
    }

    async fn return_connection(&self, conn: Box<dyn Connection>) {
        self.semaphore.add_permits(1);
        if conn.is_closed().await {
            self.discard_one();
            return;
        }
        self.idle.lock().await.push(conn);
    }

    /// Return the worker's bound connection, lazily acquiring and storing one
    /// if absent or if the stored handle reports itself closed.
    pub async fn connection_for_worker(&self, worker: WorkerId) -> Result<Arc<dyn Connection>> {
        {
            let mut bound = self.bound.lock().await;
            if let Some(conn) = bound.get(&worker) {
                if !conn.is_closed().await {
                    return Ok(conn.clone());
                }
                // Stale handle: drop the binding and fall through to acquire
                // a fresh connection.
                bound.remove(&worker);
                self.semaphore.add_permits(1);
                self.discard_one();
            }
        }

        let conn: Arc<dyn Connection> = Arc::from(self.acquire_raw().await?);
        let mut bound = self.bound.lock().await;
        bound.insert(worker, conn.clone());
        Ok(conn)
    }

    /// Close and clear the worker's bound connection.
    ///
    /// Close failures are logged, never raised.
    pub async fn release_worker(&self, worker: WorkerId) {
        let conn = { self.bound.lock().await.remove(&worker) };
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                error!(%worker, error = %e, "failed to close connection for worker");
            }
            self.semaphore.add_permits(1);
            self.discard_one();
        }
    }

    /// Number of workers with a bound connection.
    pub async fn bound_workers(&self) -> usize {
        self.bound.lock().await.len()
    }

    /// Close every idle connection and clear all worker bindings.
    ///
    /// Borrowed guards still out keep their connections; pools normally live
    /// for the registry lifetime, so this is only used on shutdown paths.
    pub async fn close(&self) {
        let workers: Vec<WorkerId> = { self.bound.lock().await.keys().copied().collect() };
        for worker in workers {
            self.release_worker(worker).await;
        }
        let drained: Vec<Box<dyn Connection>> = { self.idle.lock().await.drain(..).collect() };
        for conn in drained {
            if let Err(e) = conn.close().await {
                error!(error = %e, "failed to close idle connection");
            }
            self.discard_one();
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("url", &self.url)
            .field("size", &self.size())
            .field("options", &self.options)
            .finish()
    }
}

/// A connection borrowed from a [`ConnectionPool`], returned on drop.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    fn new(conn: Box<dyn Connection>, pool: Arc<ConnectionPool>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// The borrowed connection.
    pub fn connection(&self) -> &(dyn Connection + 'static) {
        self.conn
            .as_ref()
            .expect("connection present until drop")
            .as_ref()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("present", &self.conn.is_some())
            .finish()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.return_connection(conn).await;
            });
        }
    }
}

/// Registry of driver factories and shared pools.
///
/// Owned by the storage-backend context rather than living as a process
/// global; pools are created at most once per `(target, username)` key and
/// live as long as the registry.
pub struct PoolRegistry {
    factories: RwLock<HashMap<String, Arc<dyn ConnectionFactory>>>,
    pools: Mutex<HashMap<String, Arc<OnceCell<Arc<ConnectionPool>>>>>,
}

impl PoolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Register a driver factory under its `driver_name()`.
    pub async fn register_driver(&self, factory: Arc<dyn ConnectionFactory>) {
        let name = factory.driver_name().to_string();
        self.factories.write().await.insert(name, factory);
    }

    /// Get the shared pool for this configuration, creating it on first use.
    ///
    /// Creation is single-flight per `(url, username)` key: exactly one
    /// construction and validation run even under concurrent first access.
    pub async fn pool(&self, config: &BackendConfig) -> Result<Arc<ConnectionPool>> {
        let key = format!("{}?{}", config.url, config.username);
        let cell = {
            let mut pools = self.pools.lock().await;
            pools
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let pool = cell.get_or_try_init(|| self.create_pool(config)).await?;
        Ok(pool.clone())
    }

    async fn create_pool(&self, config: &BackendConfig) -> Result<Arc<ConnectionPool>> {
        let factory = {
            let factories = self.factories.read().await;
            factories.get(&config.driver).cloned()
        }
        .ok_or_else(|| Error::connection(format!("failed to init driver '{}'", config.driver)))?;

        let mut target = ConnectDescriptor::parse(&config.url, DEFAULT_PORT)?;
        target.ensure_parameter("useSSL", &config.ssl_mode);
        target.ensure_parameter("characterEncoding", "UTF-8");
        target.ensure_parameter("autoReconnect", true);
        target.ensure_parameter("rewriteBatchedStatements", true);
        target.ensure_parameter("cachePrepStmts", true);
        target.ensure_parameter("useServerPrepStmts", true);

        debug!(driver = %config.driver, url = %target, "creating connection pool");
        ConnectionPool::open(
            target.to_string(),
            config.credentials(),
            PoolOptions::from_config(config),
            factory,
        )
        .await
    }

    /// Number of pools created so far.
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.lock().await;
        let mut count = 0;
        for cell in pools.values() {
            if cell.initialized() {
                count += 1;
            }
        }
        count
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry").finish_non_exhaustive()
    }
}
