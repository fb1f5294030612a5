//! Common test utilities: an in-memory mock driver.
//!
//! The mock records every connection, validation run and executed statement
//! in a shared [`MockState`], and lets tests inject classified failures
//! (commit/rollback errors, already-exists conflicts, drop timeouts) to
//! exercise the session state machine without a real database.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use terrane_rdbc::prelude::*;

/// Shared observation and fault-injection state for one mock driver.
#[derive(Default)]
pub struct MockState {
    pub connects: AtomicUsize,
    pub validations: AtomicUsize,
    pub prepared: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub batch_rows_executed: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
    pub executed: Mutex<Vec<String>>,
    pub databases: Mutex<Vec<String>>,
    pub tables: Mutex<Vec<String>>,
    pub fail_connect: AtomicBool,
    pub fail_execute: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub fail_batch: AtomicBool,
    pub validation_no_rows: AtomicBool,
    pub create_conflict: AtomicBool,
    pub drop_timeout: AtomicBool,
}

impl MockState {
    pub fn last_url(&self) -> Option<String> {
        self.urls.lock().unwrap().last().cloned()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

pub struct MockConnection {
    state: Arc<MockState>,
    auto_commit: AtomicBool,
    closed: AtomicBool,
}

impl MockConnection {
    fn new(state: Arc<MockState>) -> Self {
        Self {
            state,
            auto_commit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::connection("connection is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.check_open()?;
        self.state.executed.lock().unwrap().push(sql.to_string());
        if self.state.fail_execute.load(Ordering::Acquire) {
            return Err(Error::statement_with_sql("injected execute failure", sql));
        }
        if sql.starts_with("CREATE DATABASE") {
            if self.state.create_conflict.load(Ordering::Acquire) {
                return Err(Error::already_exists("database"));
            }
        } else if sql.starts_with("DROP DATABASE")
            && self.state.drop_timeout.load(Ordering::Acquire)
        {
            return Err(Error::timeout("drop database"));
        }
        Ok(0)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.check_open()?;
        if sql.trim_start().starts_with("SELECT 1") {
            self.state.validations.fetch_add(1, Ordering::AcqRel);
            if self.state.validation_no_rows.load(Ordering::Acquire) {
                return Ok(Vec::new());
            }
            return Ok(vec![Row::new(vec!["1".into()], vec![SqlValue::Int(1)])]);
        }
        if sql.contains("information_schema.tables") {
            let tables = self.state.tables.lock().unwrap();
            for table in tables.iter() {
                if sql.contains(&format!("table_name = '{}'", table)) {
                    return Ok(vec![Row::new(
                        vec!["table_name".into()],
                        vec![SqlValue::Text(table.clone())],
                    )]);
                }
            }
            return Ok(Vec::new());
        }
        Ok(Vec::new())
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.check_open()?;
        self.state.prepared.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MockStatement {
            sql: sql.to_string(),
            state: self.state.clone(),
            pending: AtomicUsize::new(0),
            bound: Mutex::new(Vec::new()),
        }))
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.check_open()?;
        self.auto_commit.store(auto_commit, Ordering::Release);
        Ok(())
    }

    async fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::Acquire)
    }

    async fn commit(&self) -> Result<()> {
        self.check_open()?;
        if self.state.fail_commit.load(Ordering::Acquire) {
            return Err(Error::transaction("injected commit failure"));
        }
        self.state.commits.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.check_open()?;
        if self.state.fail_rollback.load(Ordering::Acquire) {
            return Err(Error::transaction("injected rollback failure"));
        }
        self.state.rollbacks.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.state.databases.lock().unwrap().clone())
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

pub struct MockStatement {
    sql: String,
    state: Arc<MockState>,
    pending: AtomicUsize,
    bound: Mutex<Vec<SqlValue>>,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn set_parameters(&self, params: &[SqlValue]) -> Result<()> {
        *self.bound.lock().unwrap() = params.to_vec();
        Ok(())
    }

    async fn add_batch(&self) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn execute_batch(&self) -> Result<u64> {
        if self.state.fail_batch.load(Ordering::Acquire) {
            return Err(Error::statement_with_sql(
                "injected batch failure",
                self.sql.as_str(),
            ));
        }
        let rows = self.pending.swap(0, Ordering::AcqRel);
        self.state
            .batch_rows_executed
            .fetch_add(rows, Ordering::AcqRel);
        Ok(rows as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MockFactory {
    state: Arc<MockState>,
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, url: &str, _credentials: &Credentials) -> Result<Box<dyn Connection>> {
        if self.state.fail_connect.load(Ordering::Acquire) {
            return Err(Error::connection("injected connect failure"));
        }
        self.state.connects.fetch_add(1, Ordering::AcqRel);
        self.state.urls.lock().unwrap().push(url.to_string());
        Ok(Box::new(MockConnection::new(self.state.clone())))
    }

    fn driver_name(&self) -> &str {
        "mysql"
    }
}

/// A registry with a mock `mysql` driver registered, plus its shared state.
pub async fn setup() -> (Arc<PoolRegistry>, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let registry = Arc::new(PoolRegistry::new());
    registry
        .register_driver(Arc::new(MockFactory {
            state: state.clone(),
        }))
        .await;
    (registry, state)
}

/// A config pointing the mock driver at `url`.
pub fn test_config(url: &str) -> BackendConfig {
    BackendConfig::new("mysql", url).with_credentials("terrane", "secret")
}
