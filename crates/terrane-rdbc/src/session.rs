//! Sessions: per-worker transactional units of work.
//!
//! A [`SessionPool`] tracks one [`Session`] per worker and exposes the
//! database-level administrative operations. A [`Session`] wraps the worker's
//! bound connection with a prepared-statement cache and batched
//! commit/rollback semantics.
//!
//! Administrative operations always run on fresh independent connections:
//! they execute outside any open transaction and must not observe or disturb
//! per-worker transaction state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::BackendConfig;
use crate::connection::{Connection, PreparedStatement};
use crate::error::{Error, ErrorCategory, Result};
use crate::pool::{ConnectionPool, PoolRegistry, WorkerId};
use crate::security::escape_string_literal;
use crate::types::Row;

/// Tracks one [`Session`] per worker for a single backing store.
pub struct SessionPool {
    registry: Arc<PoolRegistry>,
    config: BackendConfig,
    database: String,
    store: String,
    opened: AtomicBool,
    sessions: Mutex<HashMap<WorkerId, Arc<Session>>>,
}

impl SessionPool {
    /// Create a session pool for one `database/store` pair.
    ///
    /// No connection is made until [`SessionPool::open`] or the first session
    /// access.
    pub fn new(
        registry: Arc<PoolRegistry>,
        config: BackendConfig,
        database: impl Into<String>,
        store: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            config,
            database: database.into(),
            store: store.into(),
            opened: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The database this pool works against
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The database name escaped for a SQL string literal context
    pub fn escaped_database(&self) -> String {
        escape_string_literal(&self.database)
    }

    /// The store name within the database
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Whether the connectivity probe has succeeded
    pub fn opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    async fn backend_pool(&self) -> Result<Arc<ConnectionPool>> {
        self.registry.pool(&self.config).await
    }

    /// Probe connectivity by acquiring and releasing one independent
    /// connection; the pool is marked opened only if the probe succeeds.
    pub async fn open(&self) -> Result<()> {
        let pool = self.backend_pool().await?;
        let _probe = pool.acquire().await?;
        self.opened.store(true, Ordering::Release);
        Ok(())
    }

    /// The worker's session, created and opened on first access.
    pub async fn session(&self, worker: WorkerId) -> Result<Arc<Session>> {
        {
            let sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get(&worker) {
                return Ok(session.clone());
            }
        }
        let pool = self.backend_pool().await?;
        let session = Arc::new(Session::new(pool, worker));
        session.open().await?;
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.entry(worker).or_insert(session).clone())
    }

    /// Create the database, treating an already-existing database as success.
    pub async fn create_database(&self) -> Result<()> {
        debug!(database = %self.database, "creating database");

        let sql = self.build_create_database();
        let pool = self.backend_pool().await?;
        let conn = pool.acquire().await?;
        match conn.execute(&sql).await {
            Ok(_) => Ok(()),
            Err(e) if e.category() == ErrorCategory::AlreadyExists => {
                debug!(database = %self.database, "database already exists");
                Ok(())
            }
            Err(e) => Err(Error::statement_with_source(
                format!("failed to create database '{}'", self.database),
                sql,
                e,
            )),
        }
    }

    /// Drop the database, tolerating (and logging) a timed-out drop.
    pub async fn drop_database(&self) -> Result<()> {
        debug!(database = %self.database, "dropping database");

        let sql = self.build_drop_database();
        let pool = self.backend_pool().await?;
        let conn = pool.acquire().await?;
        match conn.execute(&sql).await {
            Ok(_) => Ok(()),
            Err(e) if e.category() == ErrorCategory::Timeout => {
                warn!(database = %self.database, "drop database timeout");
                Ok(())
            }
            Err(e) => Err(Error::statement_with_source(
                format!("failed to drop database '{}'", self.database),
                sql,
                e,
            )),
        }
    }

    /// Whether the database exists.
    pub async fn exists_database(&self) -> Result<bool> {
        let pool = self.backend_pool().await?;
        let conn = pool.acquire().await?;
        let databases = conn
            .list_databases()
            .await
            .map_err(|e| Error::connection_with_source("failed to obtain database info", e))?;
        Ok(databases.iter().any(|name| name == &self.database))
    }

    /// Whether a table exists in the database.
    pub async fn exists_table(&self, table: &str) -> Result<bool> {
        let sql = self.build_exists_table(table);
        let pool = self.backend_pool().await?;
        let conn = pool.acquire().await?;
        let rows = conn
            .query(&sql)
            .await
            .map_err(|e| Error::connection_with_source("failed to obtain table info", e))?;
        Ok(!rows.is_empty())
    }

    /// Force-close every tracked session so subsequent access re-acquires
    /// everything fresh. Used after catastrophic failures.
    pub async fn reset_connections(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.lock().await;
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.close().await;
        }
    }

    /// Close the pool: force-close all sessions and clear the opened flag.
    pub async fn close(&self) {
        self.reset_connections().await;
        self.opened.store(false, Ordering::Release);
    }

    fn build_create_database(&self) -> String {
        format!(
            "CREATE DATABASE IF NOT EXISTS {} DEFAULT CHARSET utf8 COLLATE utf8_bin;",
            self.database
        )
    }

    fn build_drop_database(&self) -> String {
        format!("DROP DATABASE IF EXISTS {};", self.database)
    }

    fn build_exists_table(&self, table: &str) -> String {
        format!(
            "SELECT * FROM information_schema.tables WHERE table_schema = '{}' \
             AND table_name = '{}' LIMIT 1;",
            self.escaped_database(),
            escape_string_literal(table)
        )
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("database", &self.database)
            .field("store", &self.store)
            .field("opened", &self.opened())
            .finish_non_exhaustive()
    }
}

/// One worker's transactional unit of work.
///
/// A session owns a prepared-statement cache keyed by the raw template text
/// and a pending-row counter. Identical templates prepared by different
/// workers are never shared. All methods are called by the owning worker
/// only; internal locks exist for `Send + Sync`, not for sharing.
pub struct Session {
    pool: Arc<ConnectionPool>,
    worker: WorkerId,
    statements: Mutex<HashMap<String, Arc<dyn PreparedStatement>>>,
    count: AtomicUsize,
    opened: AtomicBool,
}

impl Session {
    fn new(pool: Arc<ConnectionPool>, worker: WorkerId) -> Self {
        Self {
            pool,
            worker,
            statements: Mutex::new(HashMap::new()),
            count: AtomicUsize::new(0),
            opened: AtomicBool::new(false),
        }
    }

    /// The worker owning this session
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Bind the worker connection and mark the session opened.
    pub async fn open(&self) -> Result<()> {
        match self.pool.connection_for_worker(self.worker).await {
            Ok(_) => {
                self.opened.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.opened.store(false, Ordering::Release);
                Err(Error::connection_with_source("failed to open connection", e))
            }
        }
    }

    /// Whether the session is open
    pub fn opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Whether the session is closed
    pub fn closed(&self) -> bool {
        !self.opened()
    }

    /// Close the session: clear cached statements, then release the worker
    /// connection back to the pool. Never fails; cleanup errors are logged.
    pub async fn close(&self) {
        self.clear_statements().await;
        self.pool.release_worker(self.worker).await;
        self.opened.store(false, Ordering::Release);
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.pool.connection_for_worker(self.worker).await
    }

    async fn connection_with_auto_commit(&self, auto_commit: bool) -> Result<Arc<dyn Connection>> {
        let conn = self.connection().await?;
        if conn.auto_commit().await != auto_commit {
            conn.set_auto_commit(auto_commit).await?;
        }
        Ok(conn)
    }

    /// Switch the bound connection to manual-commit mode; subsequent batched
    /// executions accumulate until [`Session::commit`].
    pub async fn begin(&self) -> Result<()> {
        self.connection_with_auto_commit(false).await?;
        Ok(())
    }

    /// Restore auto-commit mode, logging instead of failing.
    async fn end_and_log(&self) {
        if let Err(e) = self.connection_with_auto_commit(true).await {
            warn!(worker = %self.worker, error = %e,
                  "failed to restore connection to auto-commit mode");
        }
    }

    /// The cached statement for this exact template text, created and cached
    /// on first use. No normalization is applied to the template.
    pub async fn prepare_statement(&self, template: &str) -> Result<Arc<dyn PreparedStatement>> {
        let mut statements = self.statements.lock().await;
        if let Some(statement) = statements.get(template) {
            return Ok(statement.clone());
        }
        let conn = self.connection().await?;
        let statement: Arc<dyn PreparedStatement> = Arc::from(
            conn.prepare(template)
                .await
                .map_err(|e| {
                    Error::statement_with_source("failed to prepare statement", template, e)
                })?,
        );
        statements.insert(template.to_string(), statement.clone());
        Ok(statement)
    }

    /// Append the statement's currently bound parameters as one batch row.
    pub async fn add(&self, statement: &dyn PreparedStatement) -> Result<()> {
        statement.add_batch().await.map_err(|e| {
            Error::statement_with_source(
                "failed to add statement to batch",
                statement.sql(),
                e,
            )
        })?;
        self.count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Execute every cached statement's batch and commit, returning the
    /// affected-row sum.
    ///
    /// On failure the statement cache and counter are left intact for
    /// diagnosis and the caller is expected to roll back. Auto-commit mode is
    /// restored best-effort on both branches as the final step.
    pub async fn commit(&self) -> Result<u64> {
        let result = self.execute_pending().await;
        if result.is_ok() {
            self.clear().await;
        }
        self.end_and_log().await;
        result
    }

    async fn execute_pending(&self) -> Result<u64> {
        let mut updated = 0u64;
        {
            let statements = self.statements.lock().await;
            for statement in statements.values() {
                updated += statement.execute_batch().await.map_err(|e| {
                    Error::statement_with_source(
                        "failed to execute batch",
                        statement.sql(),
                        e,
                    )
                })?;
            }
        }
        let conn = self.connection().await?;
        conn.commit()
            .await
            .map_err(|e| Error::transaction_with_source("failed to commit", e))?;
        Ok(updated)
    }

    /// Discard all batched work: clear the cache and counter first, then roll
    /// the connection back. Auto-commit mode is restored even when the
    /// rollback call itself fails; the failure is surfaced afterwards.
    pub async fn rollback(&self) -> Result<()> {
        self.clear().await;
        let result = match self.connection().await {
            Ok(conn) => conn
                .rollback()
                .await
                .map_err(|e| Error::transaction_with_source("failed to rollback", e)),
            Err(e) => Err(e),
        };
        self.end_and_log().await;
        result
    }

    /// Discard cached statements without touching the connection; the pending
    /// counter and commit mode are left as they are.
    pub async fn reset(&self) {
        self.clear_statements().await;
    }

    /// Whether any batched rows are pending
    pub fn has_changes(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    /// Number of currently cached prepared statements
    pub async fn cached_statements(&self) -> usize {
        self.statements.lock().await.len()
    }

    /// Run a query on the worker connection.
    pub async fn select(&self, sql: &str) -> Result<Vec<Row>> {
        let conn = self.connection().await?;
        conn.query(sql).await
    }

    /// Execute a one-shot statement in auto-commit mode.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let conn = self.connection_with_auto_commit(true).await?;
        conn.execute(sql).await
    }

    async fn clear(&self) {
        self.count.store(0, Ordering::Release);
        self.clear_statements().await;
    }

    async fn clear_statements(&self) {
        let drained: Vec<(String, Arc<dyn PreparedStatement>)> = {
            let mut statements = self.statements.lock().await;
            statements.drain().collect()
        };
        for (_, statement) in drained {
            if let Err(e) = statement.close().await {
                error!(worker = %self.worker, error = %e, "failed to close statement");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("worker", &self.worker)
            .field("opened", &self.opened())
            .field("has_changes", &self.has_changes())
            .finish_non_exhaustive()
    }
}
