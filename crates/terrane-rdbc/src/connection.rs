//! Driver-facing connection traits.
//!
//! The physical driver is an external collaborator: this crate reaches it only
//! through these traits, handing over the rendered descriptor text and the
//! credentials. Implementations must classify "already exists" and timeout
//! conditions as [`crate::Error::AlreadyExists`] / [`crate::Error::Timeout`]
//! so callers can branch on variants instead of message text.

use async_trait::async_trait;

use crate::config::Credentials;
use crate::error::Result;
use crate::types::{Row, SqlValue};

/// One physical connection to the relational backend.
///
/// Connections start in auto-commit mode. Switching to manual-commit mode and
/// back is how the session layer brackets batched transactions.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the affected row count
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute a query, returning all result rows
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Prepare a statement for batched execution
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Switch auto-commit mode on or off
    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Current auto-commit mode
    async fn auto_commit(&self) -> bool;

    /// Commit the open transaction (manual-commit mode only)
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction (manual-commit mode only)
    async fn rollback(&self) -> Result<()>;

    /// List catalog (database) names visible to this connection
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Whether this handle has been closed and must not be reused
    async fn is_closed(&self) -> bool;

    /// Whether the connection is alive (e.g. responds to a ping)
    async fn is_valid(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// A prepared statement that accumulates batched parameter rows.
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// The SQL template this statement was prepared from
    fn sql(&self) -> &str;

    /// Bind the parameters for the next row
    async fn set_parameters(&self, params: &[SqlValue]) -> Result<()>;

    /// Append the currently bound parameters as one batch row
    async fn add_batch(&self) -> Result<()>;

    /// Execute all batched rows, clear the batch, return the affected-row sum
    async fn execute_batch(&self) -> Result<u64>;

    /// Close the statement, releasing driver-side resources
    async fn close(&self) -> Result<()>;
}

/// Factory for physical connections, registered by driver identifier.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection to the given rendered target
    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<Box<dyn Connection>>;

    /// Identifier this factory is registered under (e.g. `mysql`)
    fn driver_name(&self) -> &str;
}
